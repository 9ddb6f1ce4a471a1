use crate::section::SectionSink;
use std::collections::BTreeMap;
use std::mem;
use umbra_common::types::index_to_local;
use umbra_common::{BlockPos, BlockState, ChunkPos, WorldProperties};

/// A fake block that must be resent to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChange {
    pub pos: BlockPos,
    pub state: BlockState,
}

/// A reveal distance that changed; observers must re-evaluate the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamismChange {
    pub pos: BlockPos,
    pub distance: u8,
}

fn key(section: usize, index: u16) -> u32 {
    ((section as u32) << 12) | index as u32
}

fn position(chunk: ChunkPos, properties: &WorldProperties, key: u32) -> BlockPos {
    let section = (key >> 12) as usize;
    let (x, y, z) = index_to_local((key & 0xFFF) as usize);
    chunk.block(x, properties.section_base_y(section) + y as i32, z)
}

/// Positions changed since the last sync pass. Later writes to the same
/// position replace earlier ones.
#[derive(Debug, Default)]
pub struct ChunkChanges {
    blocks: BTreeMap<u32, BlockState>,
    dynamism: BTreeMap<u32, u8>,
}

impl ChunkChanges {
    pub fn record_block(&mut self, section: usize, index: u16, state: BlockState) {
        self.blocks.insert(key(section, index), state);
    }

    pub fn record_dynamism(&mut self, section: usize, index: u16, distance: u8) {
        self.dynamism.insert(key(section, index), distance);
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.dynamism.is_empty()
    }

    pub fn pending_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn drain_blocks(
        &mut self,
        chunk: ChunkPos,
        properties: &WorldProperties,
    ) -> Vec<BlockChange> {
        mem::take(&mut self.blocks)
            .into_iter()
            .map(|(key, state)| BlockChange {
                pos: position(chunk, properties, key),
                state,
            })
            .collect()
    }

    pub fn drain_dynamism(
        &mut self,
        chunk: ChunkPos,
        properties: &WorldProperties,
    ) -> Vec<DynamismChange> {
        mem::take(&mut self.dynamism)
            .into_iter()
            .map(|(key, distance)| DynamismChange {
                pos: position(chunk, properties, key),
                distance,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.dynamism.clear();
    }

    /// Sink that files a section's notifications under `section`.
    pub fn for_section(&mut self, section: usize) -> SectionRecorder<'_> {
        SectionRecorder {
            changes: self,
            section,
        }
    }
}

pub struct SectionRecorder<'a> {
    changes: &'a mut ChunkChanges,
    section: usize,
}

impl SectionSink for SectionRecorder<'_> {
    fn block_changed(&mut self, index: u16, state: BlockState) {
        self.changes.record_block(self.section, index, state);
    }

    fn dynamism_changed(&mut self, index: u16, distance: u8) {
        self.changes.record_dynamism(self.section, index, distance);
    }
}
