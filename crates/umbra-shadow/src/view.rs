use crate::changes::ChunkChanges;
use crate::exposure;
use crate::modifier::ModifierPipeline;
use crate::real::RealView;
use crate::section::ShadowSection;
use std::sync::Arc;
use umbra_common::types::section_index;
use umbra_common::{
    BlockPos, BlockRegistry, BlockState, ChunkPos, Result, UmbraError, WorldProperties,
};

/// Everything a chunk needs from its world while it changes state.
pub struct ChunkContext<'a> {
    pub properties: &'a WorldProperties,
    pub registry: &'a Arc<BlockRegistry>,
    pub real: &'a dyn RealView,
    pub pipeline: &'a ModifierPipeline,
    pub dynamism_enabled: bool,
}

/// Read/write access to one chunk's fake view, handed to modifiers.
/// Real data can be read anywhere; fake data only inside the chunk.
pub struct ObfuscationView<'v, 'c> {
    chunk: ChunkPos,
    sections: &'v mut [Option<ShadowSection>],
    changes: &'v mut ChunkChanges,
    ctx: &'v ChunkContext<'c>,
}

impl<'v, 'c> ObfuscationView<'v, 'c> {
    pub(crate) fn new(
        chunk: ChunkPos,
        sections: &'v mut [Option<ShadowSection>],
        changes: &'v mut ChunkChanges,
        ctx: &'v ChunkContext<'c>,
    ) -> Self {
        Self {
            chunk,
            sections,
            changes,
            ctx,
        }
    }

    pub fn chunk(&self) -> ChunkPos {
        self.chunk
    }

    pub fn properties(&self) -> &WorldProperties {
        self.ctx.properties
    }

    pub fn registry(&self) -> &BlockRegistry {
        self.ctx.registry
    }

    pub fn dynamism_enabled(&self) -> bool {
        self.ctx.dynamism_enabled
    }

    pub fn real_block(&self, pos: BlockPos) -> Option<BlockState> {
        self.ctx.real.block(self.ctx.properties, pos)
    }

    pub fn is_exposed(&self, pos: BlockPos) -> bool {
        exposure::is_exposed(self.ctx.real, self.ctx.registry, self.ctx.properties, pos)
    }

    fn locate(&self, pos: BlockPos) -> Result<(usize, usize)> {
        if pos.chunk() != self.chunk {
            return Err(UmbraError::out_of_bounds(pos.x, pos.y, pos.z));
        }
        let section = self
            .ctx
            .properties
            .section_of(pos.y)
            .ok_or_else(|| UmbraError::out_of_bounds(pos.x, pos.y, pos.z))?;
        let local_y = (pos.y - self.ctx.properties.section_base_y(section)) as usize;
        Ok((section, section_index(pos.local_x(), local_y, pos.local_z())))
    }

    pub fn fake_block(&self, pos: BlockPos) -> Result<BlockState> {
        let (section, index) = self.locate(pos)?;
        Ok(self.sections[section]
            .as_ref()
            .map_or(BlockState::AIR, |shadow| shadow.get(index)))
    }

    /// Writes a fake block, returning whether it changed.
    pub fn set_fake(&mut self, pos: BlockPos, state: BlockState) -> Result<bool> {
        self.ctx.registry.validate(state)?;
        let (section, index) = self.locate(pos)?;
        let slot = &mut self.sections[section];
        if slot.is_none() && state == BlockState::AIR {
            return Ok(false);
        }
        let registry = self.ctx.registry;
        let shadow = slot.get_or_insert_with(|| ShadowSection::new(registry.clone()));
        let changed = shadow.set_block(index, state);
        if changed {
            self.changes.record_block(section, index as u16, state);
        }
        Ok(changed)
    }

    /// Declares a reveal distance. Ignored while dynamism is disabled.
    pub fn set_dynamism(&mut self, pos: BlockPos, distance: u8) -> Result<bool> {
        let (section, index) = self.locate(pos)?;
        if !self.ctx.dynamism_enabled {
            return Ok(false);
        }
        let registry = self.ctx.registry;
        let shadow = self.sections[section]
            .get_or_insert_with(|| ShadowSection::new(registry.clone()));
        let changed = shadow.set_dynamism(index, distance);
        if changed {
            let distance = shadow.dynamism().get_at(index);
            self.changes.record_dynamism(section, index as u16, distance);
        }
        Ok(changed)
    }

    /// Positions in the inclusive box `min..=max`, clipped to this chunk,
    /// whose real block satisfies `predicate`. Sections without real data
    /// are skipped. Results are ordered by y, then z, then x.
    pub fn find_real<P>(&self, min: BlockPos, max: BlockPos, predicate: P) -> Vec<BlockPos>
    where
        P: Fn(BlockState) -> bool,
    {
        let properties = self.ctx.properties;
        let min_x = min.x.max(self.chunk.min_block_x());
        let max_x = max.x.min(self.chunk.min_block_x() + 15);
        let min_z = min.z.max(self.chunk.min_block_z());
        let max_z = max.z.min(self.chunk.min_block_z() + 15);
        let min_y = min.y.max(properties.min_y);
        let max_y = max.y.min(properties.max_y() - 1);

        let mut found = Vec::new();
        if min_x > max_x || min_z > max_z || min_y > max_y {
            return found;
        }
        let mut y = min_y;
        while y <= max_y {
            let section = ((y - properties.min_y) >> 4) as usize;
            let base = properties.section_base_y(section);
            let section_top = max_y.min(base + 15);
            let real = self
                .ctx
                .real
                .section(self.chunk, section)
                .filter(|real| !real.is_provably_empty());
            if let Some(real) = real {
                for block_y in y..=section_top {
                    let local_y = (block_y - base) as usize;
                    for z in min_z..=max_z {
                        for x in min_x..=max_x {
                            let index =
                                section_index((x & 15) as usize, local_y, (z & 15) as usize);
                            if predicate(real.get_at(index)) {
                                found.push(BlockPos::new(x, block_y, z));
                            }
                        }
                    }
                }
            }
            y = section_top + 1;
        }
        found
    }
}
