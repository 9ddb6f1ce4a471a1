use crate::changes::{BlockChange, ChunkChanges, DynamismChange};
use crate::exposure::are_neighbors_loaded;
use crate::section::{Proximity, SectionBox, ShadowSection};
use crate::view::{ChunkContext, ObfuscationView};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use umbra_common::types::section_index;
use umbra_common::{
    BlockPos, BlockRegistry, BlockState, ChunkPos, Result, UmbraError, WorldProperties,
};
use umbra_logger::{log, LogSeverity};
use umbra_storage::ByteBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObfuscationState {
    /// Fake view equals the real view.
    Deobfuscated,
    /// Waiting for neighbour chunks before the first pass can run.
    ObfuscationRequested,
    Obfuscated,
}

/// Reproducible per chunk seed.
pub fn chunk_seed(world_seed: u64, pos: ChunkPos) -> u64 {
    let x = pos.x as i64;
    let z = pos.z as i64;
    let mixed = (world_seed as i64)
        .wrapping_add(x.wrapping_mul(x).wrapping_mul(4_987_142))
        .wrapping_add(x.wrapping_mul(5_947_611))
        .wrapping_add(z.wrapping_mul(z).wrapping_mul(4_392_871))
        .wrapping_add(z.wrapping_mul(389_711));
    (mixed as u64) ^ 0x3AD8_025F
}

fn area_seed(chunk_seed: u64, min: BlockPos) -> u64 {
    chunk_seed
        ^ (min.x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (min.y as u64).rotate_left(21)
        ^ (min.z as u64).rotate_left(42)
}

/// Shadow of one world column. Sections are indexed by their slot in the
/// column; empty slots hold `None`.
#[derive(Debug)]
pub struct ShadowChunk {
    pos: ChunkPos,
    sections: Vec<Option<ShadowSection>>,
    state: ObfuscationState,
    seed: u64,
    changes: ChunkChanges,
    /// Set by a full pipeline pass, which must be saved even when it left
    /// every cell untouched.
    needs_save: bool,
}

impl ShadowChunk {
    /// A deobfuscated shadow mirroring the real column.
    pub fn new(pos: ChunkPos, ctx: &ChunkContext<'_>) -> Self {
        let sections = (0..ctx.properties.section_count())
            .map(|section| ctx.real.section(pos, section).map(ShadowSection::mirror))
            .collect();
        Self {
            pos,
            sections,
            state: ObfuscationState::Deobfuscated,
            seed: chunk_seed(ctx.properties.seed, pos),
            changes: ChunkChanges::default(),
            needs_save: false,
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn state(&self) -> ObfuscationState {
        self.state
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn section(&self, section: usize) -> Option<&ShadowSection> {
        self.sections.get(section)?.as_ref()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.needs_save || self.sections.iter().flatten().any(ShadowSection::is_dirty)
    }

    pub fn mark_clean(&mut self) {
        self.needs_save = false;
        for section in self.sections.iter_mut().flatten() {
            section.mark_clean();
        }
    }

    pub fn fake_block(&self, properties: &WorldProperties, pos: BlockPos) -> Result<BlockState> {
        if pos.chunk() != self.pos {
            return Err(UmbraError::out_of_bounds(pos.x, pos.y, pos.z));
        }
        let section = properties
            .section_of(pos.y)
            .ok_or_else(|| UmbraError::out_of_bounds(pos.x, pos.y, pos.z))?;
        let local_y = (pos.y - properties.section_base_y(section)) as usize;
        Ok(self
            .section(section)
            .map_or(BlockState::AIR, |shadow| {
                shadow.get(section_index(pos.local_x(), local_y, pos.local_z()))
            }))
    }

    fn bounds(&self, properties: &WorldProperties) -> (BlockPos, BlockPos) {
        let min = BlockPos::new(self.pos.min_block_x(), properties.min_y, self.pos.min_block_z());
        let max = BlockPos::new(min.x + 15, properties.max_y() - 1, min.z + 15);
        (min, max)
    }

    /// Intersection of `min..=max` with this column, if any.
    fn clip(
        &self,
        properties: &WorldProperties,
        min: BlockPos,
        max: BlockPos,
    ) -> Option<(BlockPos, BlockPos)> {
        let (low, high) = self.bounds(properties);
        let min = min.component_max(&low);
        let max = max.component_min(&high);
        (min.x <= max.x && min.y <= max.y && min.z <= max.z).then_some((min, max))
    }

    fn run_pipeline(&mut self, ctx: &ChunkContext<'_>, min: BlockPos, max: BlockPos, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut view = ObfuscationView::new(self.pos, &mut self.sections, &mut self.changes, ctx);
        ctx.pipeline.run(&mut view, min, max, &mut rng);
    }

    /// Runs the full pipeline unless already obfuscated. Returns the new
    /// state, which stays `ObfuscationRequested` while neighbours the
    /// pipeline depends on are missing.
    pub fn obfuscate(&mut self, ctx: &ChunkContext<'_>) -> ObfuscationState {
        if self.state == ObfuscationState::Obfuscated {
            return self.state;
        }
        if ctx.pipeline.requires_neighbors() && !are_neighbors_loaded(ctx.real, self.pos) {
            if self.state != ObfuscationState::ObfuscationRequested {
                log(
                    format!("Chunk {} waits for its neighbours before obfuscation", self.pos),
                    LogSeverity::Debug,
                );
            }
            self.state = ObfuscationState::ObfuscationRequested;
            return self.state;
        }

        let (min, max) = self.bounds(ctx.properties);
        self.run_pipeline(ctx, min, max, self.seed);
        self.state = ObfuscationState::Obfuscated;
        self.needs_save = true;
        self.state
    }

    /// Restores every section to real data. Returns the number of changed
    /// cells.
    pub fn deobfuscate(&mut self, ctx: &ChunkContext<'_>) -> usize {
        let mut changed = 0;
        for section in 0..self.sections.len() {
            changed += self.deobfuscate_section(ctx, section, None);
        }
        self.state = ObfuscationState::Deobfuscated;
        changed
    }

    /// Deobfuscates and runs a fresh full pass with the same seed.
    pub fn reobfuscate(&mut self, ctx: &ChunkContext<'_>) -> ObfuscationState {
        self.deobfuscate(ctx);
        self.obfuscate(ctx)
    }

    fn deobfuscate_section(
        &mut self,
        ctx: &ChunkContext<'_>,
        section: usize,
        area: Option<&SectionBox>,
    ) -> usize {
        let real = ctx.real.section(self.pos, section);
        let slot = &mut self.sections[section];
        if slot.is_none() {
            if real.is_none() {
                return 0;
            }
            *slot = Some(ShadowSection::new(ctx.registry.clone()));
        }
        match slot {
            Some(shadow) => shadow.deobfuscate(real, area, &mut self.changes.for_section(section)),
            None => 0,
        }
    }

    /// Restores real data inside `min..=max` without touching the state.
    pub fn deobfuscate_area(
        &mut self,
        ctx: &ChunkContext<'_>,
        min: BlockPos,
        max: BlockPos,
    ) -> usize {
        let Some((min, max)) = self.clip(ctx.properties, min, max) else {
            return 0;
        };
        let properties = ctx.properties;
        let (Some(first), Some(last)) =
            (properties.section_of(min.y), properties.section_of(max.y))
        else {
            return 0;
        };

        let origin_x = self.pos.min_block_x();
        let origin_z = self.pos.min_block_z();
        let x = [(min.x - origin_x) as usize, (max.x - origin_x) as usize];
        let z = [(min.z - origin_z) as usize, (max.z - origin_z) as usize];
        let mut changed = 0;
        for section in first..=last {
            let base = properties.section_base_y(section);
            let area = SectionBox {
                min: [x[0], (min.y.max(base) - base) as usize, z[0]],
                max: [x[1], (max.y.min(base + 15) - base) as usize, z[1]],
            };
            changed += self.deobfuscate_section(ctx, section, Some(&area));
        }
        changed
    }

    /// Restores real data inside `min..=max` and, when obfuscated, runs the
    /// pipeline over that box again.
    pub fn reobfuscate_area(&mut self, ctx: &ChunkContext<'_>, min: BlockPos, max: BlockPos) {
        let Some((min, max)) = self.clip(ctx.properties, min, max) else {
            return;
        };
        self.deobfuscate_area(ctx, min, max);
        if self.state == ObfuscationState::Obfuscated {
            self.run_pipeline(ctx, min, max, area_seed(self.seed, min));
        }
    }

    /// Visits `(section, index, distance)` for every declared reveal
    /// distance, restricted to positions in reach of `observer` (1/16 block
    /// fixed point) when given.
    pub fn collect_dynamic_positions<F>(
        &self,
        properties: &WorldProperties,
        observer: Option<[i64; 3]>,
        mut visit: F,
    ) where
        F: FnMut(usize, u16, u8),
    {
        for (section, shadow) in self.sections.iter().enumerate() {
            let Some(shadow) = shadow else {
                continue;
            };
            let origin = self.pos.block(0, properties.section_base_y(section), 0);
            let proximity = observer.map(|observer| Proximity::new(observer, origin));
            shadow.collect_dynamic_positions(proximity.as_ref(), |index, distance| {
                visit(section, index, distance)
            });
        }
    }

    /// Fake blocks changed since the last call.
    pub fn drain_changes(&mut self, properties: &WorldProperties) -> Vec<BlockChange> {
        self.changes.drain_blocks(self.pos, properties)
    }

    pub fn drain_dynamism_changes(&mut self, properties: &WorldProperties) -> Vec<DynamismChange> {
        self.changes.drain_dynamism(self.pos, properties)
    }

    /// Drops pending notifications, used when observers receive the whole
    /// column anyway.
    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    /// `[u32 real checksum][varint section count]` then `[u8 present]` and
    /// the section for every slot.
    pub fn serialize(&self, checksum: u32) -> Vec<u8> {
        let mut buffer = ByteBuffer::new();
        buffer.write_u32(checksum);
        buffer.write_varint(self.sections.len() as i32);
        for slot in &self.sections {
            match slot {
                Some(section) => {
                    buffer.write_u8(1);
                    section.serialize(&mut buffer);
                }
                None => buffer.write_u8(0),
            }
        }
        buffer.into_inner()
    }

    /// Rebuilds an obfuscated chunk, returning it with the real checksum it
    /// was saved against.
    pub fn deserialize(
        pos: ChunkPos,
        bytes: &[u8],
        properties: &WorldProperties,
        registry: &Arc<BlockRegistry>,
    ) -> Result<(Self, u32)> {
        let mut buffer = ByteBuffer::from_bytes(bytes.to_vec());
        let checksum = buffer.read_u32()?;
        let count = buffer.read_length(properties.section_count())?;
        if count != properties.section_count() {
            return Err(UmbraError::corrupt(format!(
                "chunk {} has {} sections, world has {}",
                pos,
                count,
                properties.section_count()
            )));
        }

        let mut sections = Vec::with_capacity(count);
        for _ in 0..count {
            let section = match buffer.read_u8()? {
                0 => None,
                1 => Some(ShadowSection::deserialize(&mut buffer, registry.clone())?),
                flag => {
                    return Err(UmbraError::corrupt(format!("bad section flag {}", flag)));
                }
            };
            sections.push(section);
        }
        if buffer.remaining() != 0 {
            return Err(UmbraError::corrupt(format!(
                "{} trailing bytes after chunk {}",
                buffer.remaining(),
                pos
            )));
        }

        let chunk = Self {
            pos,
            sections,
            state: ObfuscationState::Obfuscated,
            seed: chunk_seed(properties.seed, pos),
            changes: ChunkChanges::default(),
            needs_save: false,
        };
        Ok((chunk, checksum))
    }
}
