use std::collections::HashMap;
use std::sync::Arc;
use umbra_common::types::section_index;
use umbra_common::{
    BlockPos, BlockRegistry, BlockState, ChunkPos, Result, UmbraError, WorldProperties,
};
use umbra_storage::{ByteBuffer, PalettedSection};

/// Read access to the authoritative block data owned by the host.
pub trait RealView {
    /// Real section `section` of `chunk`, `None` when empty or unloaded.
    fn section(&self, chunk: ChunkPos, section: usize) -> Option<&PalettedSection>;

    fn is_loaded(&self, chunk: ChunkPos) -> bool;

    /// Writes a real block and returns the previous state.
    fn set_block(
        &mut self,
        properties: &WorldProperties,
        pos: BlockPos,
        state: BlockState,
    ) -> Result<BlockState>;

    /// Real block at `pos`. `None` when the chunk is not loaded or `pos`
    /// lies outside the world vertically. Empty sections read as air.
    fn block(&self, properties: &WorldProperties, pos: BlockPos) -> Option<BlockState> {
        let section = properties.section_of(pos.y)?;
        let chunk = pos.chunk();
        if !self.is_loaded(chunk) {
            return None;
        }
        let local_y = (pos.y - properties.section_base_y(section)) as usize;
        Some(
            self.section(chunk, section)
                .map(|real| real.get_at(section_index(pos.local_x(), local_y, pos.local_z())))
                .unwrap_or(BlockState::AIR),
        )
    }
}

/// CRC32 over the serialized real sections of a column. Cached shadows
/// record it so a shadow built from older real data is never restored.
pub fn column_checksum(real: &dyn RealView, chunk: ChunkPos, section_count: usize) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for section in 0..section_count {
        match real.section(chunk, section) {
            Some(paletted) => {
                let mut buffer = ByteBuffer::new();
                paletted.serialize(&mut buffer);
                hasher.update(&[1]);
                hasher.update(buffer.as_slice());
            }
            None => hasher.update(&[0]),
        }
    }
    hasher.finalize()
}

/// One loaded column of real data.
#[derive(Debug, Clone)]
pub struct RealColumn {
    sections: Vec<Option<PalettedSection>>,
}

impl RealColumn {
    pub fn new(section_count: usize) -> Self {
        Self {
            sections: vec![None; section_count],
        }
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, section: usize) -> Option<&PalettedSection> {
        self.sections.get(section)?.as_ref()
    }

    pub fn set_section(&mut self, section: usize, paletted: Option<PalettedSection>) -> Result<()> {
        let slot = self.sections.get_mut(section).ok_or_else(|| {
            UmbraError::IllegalState(format!("column has no section {}", section))
        })?;
        *slot = paletted;
        Ok(())
    }

    /// Writes a block by section and section index, creating the section on
    /// first write.
    pub fn set(
        &mut self,
        registry: &Arc<BlockRegistry>,
        section: usize,
        index: usize,
        state: BlockState,
    ) -> Result<BlockState> {
        registry.validate(state)?;
        let slot = self.sections.get_mut(section).ok_or_else(|| {
            UmbraError::IllegalState(format!("column has no section {}", section))
        })?;
        if slot.is_none() && state == BlockState::AIR {
            return Ok(BlockState::AIR);
        }
        let paletted = slot.get_or_insert_with(|| PalettedSection::new(registry.clone()));
        Ok(paletted.set_at(index, state))
    }
}

/// In-memory real world used by the bundled engine and tests.
#[derive(Debug)]
pub struct RealWorld {
    registry: Arc<BlockRegistry>,
    columns: HashMap<ChunkPos, RealColumn>,
}

impl RealWorld {
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self {
            registry,
            columns: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn insert_column(&mut self, pos: ChunkPos, column: RealColumn) -> Option<RealColumn> {
        self.columns.insert(pos, column)
    }

    pub fn remove_column(&mut self, pos: ChunkPos) -> Option<RealColumn> {
        self.columns.remove(&pos)
    }

    pub fn column(&self, pos: ChunkPos) -> Option<&RealColumn> {
        self.columns.get(&pos)
    }

    pub fn loaded(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.columns.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl RealView for RealWorld {
    fn section(&self, chunk: ChunkPos, section: usize) -> Option<&PalettedSection> {
        self.columns.get(&chunk)?.section(section)
    }

    fn is_loaded(&self, chunk: ChunkPos) -> bool {
        self.columns.contains_key(&chunk)
    }

    fn set_block(
        &mut self,
        properties: &WorldProperties,
        pos: BlockPos,
        state: BlockState,
    ) -> Result<BlockState> {
        let section = properties
            .section_of(pos.y)
            .ok_or_else(|| UmbraError::out_of_bounds(pos.x, pos.y, pos.z))?;
        let column = self
            .columns
            .get_mut(&pos.chunk())
            .ok_or(UmbraError::ChunkNotLoaded(pos.chunk()))?;
        let local_y = (pos.y - properties.section_base_y(section)) as usize;
        column.set(
            &self.registry,
            section,
            section_index(pos.local_x(), local_y, pos.local_z()),
            state,
        )
    }
}
