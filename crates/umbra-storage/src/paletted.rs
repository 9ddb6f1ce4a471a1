use crate::buffer::ByteBuffer;
use crate::palette::{identity_bits, Palette, PaletteKind, MAX_HASHED_BITS, MIN_BITS};
use std::sync::Arc;
use umbra_common::types::{checked_section_index, SECTION_VOLUME};
use umbra_common::{BlockRegistry, BlockState, Result, UmbraError};

/// Fixed width integers packed into longs. A value may straddle two longs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArray {
    bits: u8,
    data: Vec<u64>,
}

impl PackedArray {
    pub fn new(bits: u8) -> Self {
        Self {
            bits,
            data: vec![0; Self::longs_for(bits)],
        }
    }

    /// Number of longs needed for 4096 values of `bits` width.
    pub fn longs_for(bits: u8) -> usize {
        (SECTION_VOLUME * bits as usize + 63) / 64
    }

    pub fn from_longs(bits: u8, data: Vec<u64>) -> Option<Self> {
        (data.len() == Self::longs_for(bits)).then_some(Self { bits, data })
    }

    pub fn longs(&self) -> &[u64] {
        &self.data
    }

    pub fn get(&self, index: usize) -> u32 {
        let bits = self.bits as usize;
        let start_long = (index * bits) / 64;
        let start_offset = (index * bits) % 64;
        let end_long = ((index + 1) * bits - 1) / 64;
        let mask = (1u64 << bits) - 1;

        let value = if start_long == end_long {
            self.data[start_long] >> start_offset
        } else {
            let end_offset = 64 - start_offset;
            (self.data[start_long] >> start_offset) | (self.data[end_long] << end_offset)
        };
        (value & mask) as u32
    }

    pub fn set(&mut self, index: usize, value: u32) {
        let bits = self.bits as usize;
        let start_long = (index * bits) / 64;
        let start_offset = (index * bits) % 64;
        let end_long = ((index + 1) * bits - 1) / 64;
        let mask = (1u64 << bits) - 1;
        let value = value as u64 & mask;

        self.data[start_long] &= !(mask << start_offset);
        self.data[start_long] |= value << start_offset;

        if start_long != end_long {
            let spill = 64 - start_offset;
            self.data[end_long] &= !(mask >> spill);
            self.data[end_long] |= value >> spill;
        }
    }
}

/// Palette compressed storage of the 4096 block states of one section.
#[derive(Debug, Clone)]
pub struct PalettedSection {
    bits: u8,
    palette: Palette,
    storage: PackedArray,
    registry: Arc<BlockRegistry>,
}

impl PalettedSection {
    /// An all air section.
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        let kind = PaletteKind::for_bits(MIN_BITS, &registry);
        let bits = match kind {
            PaletteKind::Identity => identity_bits(&registry),
            _ => MIN_BITS,
        };
        Self {
            bits,
            palette: Palette::new(kind),
            storage: PackedArray::new(bits),
            registry,
        }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> Result<BlockState> {
        Ok(self.get_at(checked_section_index(x, y, z)?))
    }

    /// Sets a block and returns the previous state.
    pub fn set(&mut self, x: usize, y: usize, z: usize, state: BlockState) -> Result<BlockState> {
        let index = checked_section_index(x, y, z)?;
        self.registry.validate(state)?;
        Ok(self.set_at(index, state))
    }

    /// Reads by section index. Ids that resolve to nothing read as air.
    pub fn get_at(&self, index: usize) -> BlockState {
        let id = self.storage.get(index);
        self.palette
            .state_of(id, &self.registry)
            .unwrap_or(BlockState::AIR)
    }

    /// Writes by section index; `state` must be registered.
    pub fn set_at(&mut self, index: usize, state: BlockState) -> BlockState {
        debug_assert!(self.registry.contains(state));
        let previous = self.get_at(index);
        if previous == state {
            return previous;
        }
        let id = self.id_for(state);
        self.storage.set(index, id);
        previous
    }

    fn id_for(&mut self, state: BlockState) -> u32 {
        if let Some(id) = self.palette.id_of(state) {
            return id;
        }
        if !self.palette.has_room(self.bits) {
            let next = self.grown_bits();
            self.resize(next);
        }
        self.palette.insert(state)
    }

    fn grown_bits(&self) -> u8 {
        let identity = identity_bits(&self.registry);
        let next = self.bits + 1;
        if next > MAX_HASHED_BITS || next >= identity {
            identity
        } else {
            next
        }
    }

    /// Rebuilds storage with wider ids, re-inserting every cell. Widths never
    /// shrink, so asking for a narrower or equal width is a no-op.
    pub fn resize(&mut self, new_bits: u8) {
        if new_bits <= self.bits {
            return;
        }
        let kind = PaletteKind::for_bits(new_bits, &self.registry);
        let new_bits = match kind {
            PaletteKind::Identity => identity_bits(&self.registry).max(new_bits),
            _ => new_bits,
        };

        let mut palette = Palette::new(kind);
        let mut storage = PackedArray::new(new_bits);
        for index in 0..SECTION_VOLUME {
            let state = self.get_at(index);
            let id = match palette.id_of(state) {
                Some(id) => id,
                None => palette.insert(state),
            };
            storage.set(index, id);
        }

        self.bits = new_bits;
        self.palette = palette;
        self.storage = storage;
    }

    /// True when the palette can only ever produce air. Cheap, but may say
    /// false for a section that happens to be all air.
    pub fn is_provably_empty(&self) -> bool {
        self.palette.entries() == [BlockState::AIR]
    }

    pub fn count_non_air(&self) -> u16 {
        if self.is_provably_empty() {
            return 0;
        }
        (0..SECTION_VOLUME)
            .filter(|index| !self.registry.is_air(self.get_at(*index)))
            .count() as u16
    }

    /// Writes `[u8 bits][palette][varint storage length][storage longs]`.
    pub fn serialize(&self, buffer: &mut ByteBuffer) {
        buffer.write_u8(self.bits);
        if self.palette.kind() != PaletteKind::Identity {
            buffer.write_varint(self.palette.len() as i32);
            for state in self.palette.entries() {
                buffer.write_varint(state.0 as i32);
            }
        }
        buffer.write_varint(self.storage.longs().len() as i32);
        for long in self.storage.longs() {
            buffer.write_u64(*long);
        }
    }

    pub fn deserialize(buffer: &mut ByteBuffer, registry: Arc<BlockRegistry>) -> Result<Self> {
        let bits = buffer.read_u8()?;
        if !(MIN_BITS..=identity_bits(&registry)).contains(&bits) {
            return Err(UmbraError::corrupt(format!("section bit width {}", bits)));
        }
        let kind = PaletteKind::for_bits(bits, &registry);
        if kind == PaletteKind::Identity && bits != identity_bits(&registry) {
            return Err(UmbraError::corrupt(format!(
                "identity palette with bit width {}",
                bits
            )));
        }

        let palette = if kind == PaletteKind::Identity {
            Palette::Identity
        } else {
            let len = buffer.read_length(1 << bits)?;
            if len == 0 {
                return Err(UmbraError::corrupt("empty section palette"));
            }
            let mut entries = Vec::with_capacity(len);
            for _ in 0..len {
                let state = BlockState(buffer.read_varint()? as u32);
                if !registry.contains(state) || entries.contains(&state) {
                    return Err(UmbraError::corrupt(format!(
                        "bad palette entry {}",
                        state.0
                    )));
                }
                entries.push(state);
            }
            Palette::from_entries(kind, entries)
        };

        let longs = buffer.read_length(PackedArray::longs_for(bits))?;
        let mut data = Vec::with_capacity(longs);
        for _ in 0..longs {
            data.push(buffer.read_u64()?);
        }
        let storage = PackedArray::from_longs(bits, data).ok_or_else(|| {
            UmbraError::corrupt(format!("storage of {} longs for {} bits", longs, bits))
        })?;

        Ok(Self {
            bits,
            palette,
            storage,
            registry,
        })
    }
}
