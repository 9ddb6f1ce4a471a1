use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, crate::error::UmbraError>;

/// Edge length of a section in blocks.
pub const SECTION_SIZE: usize = 16;
/// Number of blocks in a section.
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;

/// Index of a block inside a section, laid out as `y << 8 | z << 4 | x`.
#[inline]
pub fn section_index(x: usize, y: usize, z: usize) -> usize {
    (y << 8) | (z << 4) | x
}

/// Checked variant of [`section_index`] for caller supplied coordinates.
pub fn checked_section_index(x: usize, y: usize, z: usize) -> Result<usize> {
    if x >= SECTION_SIZE || y >= SECTION_SIZE || z >= SECTION_SIZE {
        return Err(crate::error::UmbraError::out_of_bounds(
            x as i32, y as i32, z as i32,
        ));
    }
    Ok(section_index(x, y, z))
}

/// Inverse of [`section_index`], returns `(x, y, z)`.
#[inline]
pub fn index_to_local(index: usize) -> (usize, usize, usize) {
    (index & 15, (index >> 8) & 15, (index >> 4) & 15)
}

/// Absolute block coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x >> 4, self.z >> 4)
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// X coordinate inside the owning chunk (0..16).
    pub fn local_x(&self) -> usize {
        (self.x & 15) as usize
    }

    /// Z coordinate inside the owning chunk (0..16).
    pub fn local_z(&self) -> usize {
        (self.z & 15) as usize
    }

    pub fn component_min(&self, other: &BlockPos) -> BlockPos {
        BlockPos::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn component_max(&self, other: &BlockPos) -> BlockPos {
        BlockPos::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Column coordinate, one chunk spans 16x16 blocks horizontally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The four laterally adjacent chunks (-x, +x, -z, +z).
    pub fn neighbors(&self) -> [ChunkPos; 4] {
        [
            ChunkPos::new(self.x - 1, self.z),
            ChunkPos::new(self.x + 1, self.z),
            ChunkPos::new(self.x, self.z - 1),
            ChunkPos::new(self.x, self.z + 1),
        ]
    }

    pub fn min_block_x(&self) -> i32 {
        self.x << 4
    }

    pub fn min_block_z(&self) -> i32 {
        self.z << 4
    }

    pub fn contains(&self, pos: &BlockPos) -> bool {
        pos.chunk() == *self
    }

    /// Absolute position of a chunk local block.
    pub fn block(&self, local_x: usize, y: i32, local_z: usize) -> BlockPos {
        BlockPos::new(
            self.min_block_x() + local_x as i32,
            y,
            self.min_block_z() + local_z as i32,
        )
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Observer position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn block(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    pub fn chunk(&self) -> ChunkPos {
        self.block().chunk()
    }

    /// Position in 1/16 block fixed point.
    pub fn scaled(&self) -> [i64; 3] {
        [
            (self.x * 16.0).round() as i64,
            (self.y * 16.0).round() as i64,
            (self.z * 16.0).round() as i64,
        ]
    }
}

/// Static description of the world a shadow view belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldProperties {
    pub name: String,
    pub seed: u64,
    /// Lowest block y, a multiple of 16.
    pub min_y: i32,
    /// Height in blocks, a multiple of 16.
    pub height: u32,
}

impl WorldProperties {
    pub fn new(name: impl Into<String>, seed: u64, min_y: i32, height: u32) -> Self {
        Self {
            name: name.into(),
            seed,
            min_y,
            height,
        }
    }

    pub fn section_count(&self) -> usize {
        (self.height as usize) / SECTION_SIZE
    }

    /// Exclusive upper bound of block y.
    pub fn max_y(&self) -> i32 {
        self.min_y + self.height as i32
    }

    pub fn contains_y(&self, y: i32) -> bool {
        y >= self.min_y && y < self.max_y()
    }

    /// Section slot holding block `y`, if inside the world.
    pub fn section_of(&self, y: i32) -> Option<usize> {
        if self.contains_y(y) {
            Some(((y - self.min_y) >> 4) as usize)
        } else {
            None
        }
    }

    pub fn section_base_y(&self, section: usize) -> i32 {
        self.min_y + (section * SECTION_SIZE) as i32
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_y % 16 != 0 || self.height % 16 != 0 || self.height == 0 {
            return Err(crate::error::UmbraError::Config(format!(
                "world {} must have min_y and height aligned to 16 (min_y {}, height {})",
                self.name, self.min_y, self.height
            )));
        }
        Ok(())
    }
}
