use crate::changes::{BlockChange, DynamismChange};
use crate::chunk::{ObfuscationState, ShadowChunk};
use crate::exposure;
use crate::modifier::ModifierPipeline;
use crate::real::{column_checksum, RealView};
use crate::view::ChunkContext;
use std::collections::HashMap;
use std::sync::Arc;
use umbra_common::{
    BlockPos, BlockRegistry, BlockState, ChunkPos, Result, Signature, UmbraError, WorldProperties,
};
use umbra_logger::{log, LogSeverity};
use umbra_storage::PalettedSection;

/// Owns every shadow chunk of one world and resolves neighbours through
/// its coordinate map.
pub struct ShadowWorld<R: RealView> {
    properties: WorldProperties,
    registry: Arc<BlockRegistry>,
    real: R,
    pipeline: ModifierPipeline,
    dynamism_enabled: bool,
    chunks: HashMap<ChunkPos, ShadowChunk>,
}

impl<R: RealView> ShadowWorld<R> {
    pub fn new(
        properties: WorldProperties,
        registry: Arc<BlockRegistry>,
        real: R,
        pipeline: ModifierPipeline,
        dynamism_enabled: bool,
    ) -> Result<Self> {
        properties.validate()?;
        Ok(Self {
            properties,
            registry,
            real,
            pipeline,
            dynamism_enabled,
            chunks: HashMap::new(),
        })
    }

    fn split(&mut self) -> (ChunkContext<'_>, &mut HashMap<ChunkPos, ShadowChunk>) {
        let ctx = ChunkContext {
            properties: &self.properties,
            registry: &self.registry,
            real: &self.real,
            pipeline: &self.pipeline,
            dynamism_enabled: self.dynamism_enabled,
        };
        (ctx, &mut self.chunks)
    }

    pub fn properties(&self) -> &WorldProperties {
        &self.properties
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn real(&self) -> &R {
        &self.real
    }

    /// Direct access to the real view. Callers that write blocks through it
    /// must report them with [`ShadowWorld::on_real_block_changed`].
    pub fn real_mut(&mut self) -> &mut R {
        &mut self.real
    }

    pub fn pipeline(&self) -> &ModifierPipeline {
        &self.pipeline
    }

    pub fn dynamism_enabled(&self) -> bool {
        self.dynamism_enabled
    }

    /// Cache signature of views produced by this world.
    pub fn signature(&self, generation: u64) -> Signature {
        self.pipeline.signature(self.dynamism_enabled, generation)
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&ShadowChunk> {
        self.chunks.get(&pos)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &ShadowChunk> {
        self.chunks.values()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn state(&self, pos: ChunkPos) -> Option<ObfuscationState> {
        self.chunks.get(&pos).map(ShadowChunk::state)
    }

    /// Retries neighbours that were waiting for `pos` to load.
    fn wake_neighbors(&mut self, pos: ChunkPos) {
        let (ctx, chunks) = self.split();
        for neighbor in pos.neighbors() {
            if let Some(chunk) = chunks.get_mut(&neighbor) {
                if chunk.state() == ObfuscationState::ObfuscationRequested {
                    chunk.obfuscate(&ctx);
                }
            }
        }
    }

    /// Creates a deobfuscated shadow mirroring the freshly loaded real column.
    pub fn on_chunk_loaded(&mut self, pos: ChunkPos) -> Result<()> {
        if !self.real.is_loaded(pos) {
            return Err(UmbraError::ChunkNotLoaded(pos));
        }
        let (ctx, chunks) = self.split();
        chunks.insert(pos, ShadowChunk::new(pos, &ctx));
        self.wake_neighbors(pos);
        Ok(())
    }

    /// Installs a cached shadow. Returns false, leaving the world untouched,
    /// when the cached view was computed from different real data.
    pub fn restore_chunk(&mut self, pos: ChunkPos, bytes: &[u8]) -> Result<bool> {
        if !self.real.is_loaded(pos) {
            return Err(UmbraError::ChunkNotLoaded(pos));
        }
        let (chunk, checksum) =
            ShadowChunk::deserialize(pos, bytes, &self.properties, &self.registry)?;
        let current = column_checksum(&self.real, pos, self.properties.section_count());
        if checksum != current {
            log(
                format!("Cached view of chunk {} is older than its real data", pos),
                LogSeverity::Debug,
            );
            return Ok(false);
        }
        self.chunks.insert(pos, chunk);
        self.wake_neighbors(pos);
        Ok(true)
    }

    pub fn on_chunk_unloaded(&mut self, pos: ChunkPos) -> Option<ShadowChunk> {
        self.chunks.remove(&pos)
    }

    fn with_chunk<T>(
        &mut self,
        pos: ChunkPos,
        op: impl FnOnce(&mut ShadowChunk, &ChunkContext<'_>) -> T,
    ) -> Result<T> {
        let (ctx, chunks) = self.split();
        let chunk = chunks.get_mut(&pos).ok_or(UmbraError::ChunkNotLoaded(pos))?;
        Ok(op(chunk, &ctx))
    }

    pub fn obfuscate(&mut self, pos: ChunkPos) -> Result<ObfuscationState> {
        self.with_chunk(pos, |chunk, ctx| chunk.obfuscate(ctx))
    }

    pub fn deobfuscate(&mut self, pos: ChunkPos) -> Result<usize> {
        self.with_chunk(pos, |chunk, ctx| chunk.deobfuscate(ctx))
    }

    pub fn reobfuscate(&mut self, pos: ChunkPos) -> Result<ObfuscationState> {
        self.with_chunk(pos, |chunk, ctx| chunk.reobfuscate(ctx))
    }

    fn check_y(&self, pos: BlockPos) -> Result<()> {
        if self.properties.contains_y(pos.y) {
            Ok(())
        } else {
            Err(UmbraError::out_of_bounds(pos.x, pos.y, pos.z))
        }
    }

    /// Writes a real block and propagates it to the shadow.
    pub fn set_real_block(&mut self, pos: BlockPos, state: BlockState) -> Result<BlockState> {
        let previous = self.real.set_block(&self.properties, pos, state)?;
        if previous != state {
            self.on_real_block_changed(pos)?;
        }
        Ok(previous)
    }

    /// Brings the shadow in line with a real block that already changed.
    /// Unobfuscated columns mirror the block; obfuscated ones rerun the
    /// pipeline over the surrounding 3x3x3 box, since the change can alter
    /// the exposure of every face neighbour.
    pub fn on_real_block_changed(&mut self, pos: BlockPos) -> Result<()> {
        self.check_y(pos)?;
        let min = BlockPos::new(pos.x - 1, (pos.y - 1).max(self.properties.min_y), pos.z - 1);
        let max = BlockPos::new(pos.x + 1, (pos.y + 1).min(self.properties.max_y() - 1), pos.z + 1);
        let origin = pos.chunk();

        let (ctx, chunks) = self.split();
        for column in columns(min, max) {
            let Some(chunk) = chunks.get_mut(&column) else {
                continue;
            };
            if chunk.state() == ObfuscationState::Obfuscated {
                chunk.reobfuscate_area(&ctx, min, max);
            } else if column == origin {
                chunk.deobfuscate_area(&ctx, pos, pos);
            }
        }
        Ok(())
    }

    pub fn is_exposed(&self, pos: BlockPos) -> bool {
        exposure::is_exposed(&self.real, &self.registry, &self.properties, pos)
    }

    pub fn are_neighbors_loaded(&self, pos: ChunkPos) -> bool {
        exposure::are_neighbors_loaded(&self.real, pos)
    }

    /// Checks an area request. `Ok(None)` means a silent no-op.
    fn area_columns(
        &self,
        min: BlockPos,
        max: BlockPos,
        silent_fail: bool,
        require_obfuscated: bool,
    ) -> Result<Option<Vec<ChunkPos>>> {
        self.check_y(min)?;
        self.check_y(max)?;
        let targets = columns(min, max);
        for column in &targets {
            let failure = match self.chunks.get(column) {
                Some(_) if !self.real.is_loaded(*column) => UmbraError::ChunkNotLoaded(*column),
                Some(chunk)
                    if require_obfuscated && chunk.state() != ObfuscationState::Obfuscated =>
                {
                    UmbraError::IllegalState(format!("chunk {} is not obfuscated", column))
                }
                Some(_) => continue,
                None => UmbraError::ChunkNotLoaded(*column),
            };
            return if silent_fail { Ok(None) } else { Err(failure) };
        }
        Ok(Some(targets))
    }

    /// Restores real data inside the box. Applies to every touched column or
    /// to none of them.
    pub fn deobfuscate_area(
        &mut self,
        min: BlockPos,
        max: BlockPos,
        silent_fail: bool,
    ) -> Result<usize> {
        let (min, max) = (min.component_min(&max), min.component_max(&max));
        let Some(targets) = self.area_columns(min, max, silent_fail, false)? else {
            return Ok(0);
        };
        let (ctx, chunks) = self.split();
        let mut changed = 0;
        for column in targets {
            if let Some(chunk) = chunks.get_mut(&column) {
                changed += chunk.deobfuscate_area(&ctx, min, max);
            }
        }
        Ok(changed)
    }

    /// Recomputes the fake view inside the box. Every touched column must be
    /// obfuscated.
    pub fn reobfuscate_area(
        &mut self,
        min: BlockPos,
        max: BlockPos,
        silent_fail: bool,
    ) -> Result<()> {
        let (min, max) = (min.component_min(&max), min.component_max(&max));
        let Some(targets) = self.area_columns(min, max, silent_fail, true)? else {
            return Ok(());
        };
        let (ctx, chunks) = self.split();
        for column in targets {
            if let Some(chunk) = chunks.get_mut(&column) {
                chunk.reobfuscate_area(&ctx, min, max);
            }
        }
        Ok(())
    }

    pub fn fake_block(&self, pos: BlockPos) -> Result<BlockState> {
        self.chunks
            .get(&pos.chunk())
            .ok_or(UmbraError::ChunkNotLoaded(pos.chunk()))?
            .fake_block(&self.properties, pos)
    }

    pub fn real_block(&self, pos: BlockPos) -> Option<BlockState> {
        self.real.block(&self.properties, pos)
    }

    pub fn fake_section(&self, pos: ChunkPos, section: usize) -> Option<&PalettedSection> {
        self.chunks.get(&pos)?.section(section).map(|shadow| shadow.fake())
    }

    pub fn drain_changes(&mut self, pos: ChunkPos) -> Vec<BlockChange> {
        let properties = &self.properties;
        self.chunks
            .get_mut(&pos)
            .map(|chunk| chunk.drain_changes(properties))
            .unwrap_or_default()
    }

    /// Fake block changes of every chunk since the last drain.
    pub fn drain_all_changes(&mut self) -> Vec<BlockChange> {
        let properties = &self.properties;
        self.chunks
            .values_mut()
            .flat_map(|chunk| chunk.drain_changes(properties))
            .collect()
    }

    pub fn drain_dynamism_changes(&mut self) -> Vec<DynamismChange> {
        let properties = &self.properties;
        self.chunks
            .values_mut()
            .flat_map(|chunk| chunk.drain_dynamism_changes(properties))
            .collect()
    }

    /// Discards pending notifications of one chunk.
    pub fn clear_changes(&mut self, pos: ChunkPos) {
        if let Some(chunk) = self.chunks.get_mut(&pos) {
            chunk.clear_changes();
        }
    }

    /// Serialized shadow of an obfuscated chunk, marking it clean.
    pub fn serialize_chunk(&mut self, pos: ChunkPos) -> Result<Vec<u8>> {
        let checksum = column_checksum(&self.real, pos, self.properties.section_count());
        let chunk = self
            .chunks
            .get_mut(&pos)
            .ok_or(UmbraError::ChunkNotLoaded(pos))?;
        if chunk.state() != ObfuscationState::Obfuscated {
            return Err(UmbraError::IllegalState(format!(
                "chunk {} is not obfuscated",
                pos
            )));
        }
        let bytes = chunk.serialize(checksum);
        chunk.mark_clean();
        Ok(bytes)
    }

    /// Obfuscated chunks with unsaved changes.
    pub fn dirty_chunks(&self) -> Vec<ChunkPos> {
        let mut dirty: Vec<_> = self
            .chunks
            .values()
            .filter(|chunk| chunk.state() == ObfuscationState::Obfuscated && chunk.is_dirty())
            .map(ShadowChunk::pos)
            .collect();
        dirty.sort();
        dirty
    }
}

/// Chunk columns intersecting the block box, in x then z order.
fn columns(min: BlockPos, max: BlockPos) -> Vec<ChunkPos> {
    let (low, high) = (min.chunk(), max.chunk());
    (low.x..=high.x)
        .flat_map(|x| (low.z..=high.z).map(move |z| ChunkPos::new(x, z)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::ModifierConfig;
    use crate::real::{RealColumn, RealWorld};
    use assert_matches::assert_matches;

    const STONE: BlockState = BlockState(1);
    const ORE: BlockState = BlockState(2);

    fn world(chunks: &[ChunkPos]) -> ShadowWorld<RealWorld> {
        let registry = Arc::new(
            BlockRegistry::builder()
                .air("air")
                .opaque("stone")
                .opaque("diamond_ore")
                .build()
                .unwrap(),
        );
        let properties = WorldProperties::new("test", 9, 0, 32);
        let mut real = RealWorld::new(registry.clone());
        for chunk in chunks {
            let mut column = RealColumn::new(properties.section_count());
            for index in 0..4096 {
                column.set(&registry, 0, index, STONE).unwrap();
            }
            real.insert_column(*chunk, column);
        }
        let pipeline = ModifierPipeline::from_configs(
            &[ModifierConfig::HideOres {
                hidden: vec!["diamond_ore".into()],
                replacement: "stone".into(),
            }],
            &registry,
            &properties,
        )
        .unwrap();
        let mut world = ShadowWorld::new(properties, registry, real, pipeline, true).unwrap();
        for chunk in chunks {
            world.on_chunk_loaded(*chunk).unwrap();
        }
        world
    }

    fn grid(radius: i32) -> Vec<ChunkPos> {
        (-radius..=radius)
            .flat_map(|x| (-radius..=radius).map(move |z| ChunkPos::new(x, z)))
            .collect()
    }

    #[test]
    fn test_neighbor_load_completes_request() {
        let center = ChunkPos::new(0, 0);
        let mut world = world(&[center]);
        assert_eq!(world.obfuscate(center).unwrap(), ObfuscationState::ObfuscationRequested);

        let section_count = world.properties().section_count();
        for neighbor in center.neighbors() {
            assert_eq!(world.state(center), Some(ObfuscationState::ObfuscationRequested));
            world
                .real_mut()
                .insert_column(neighbor, RealColumn::new(section_count));
            world.on_chunk_loaded(neighbor).unwrap();
        }
        assert_eq!(world.state(center), Some(ObfuscationState::Obfuscated));
    }

    #[test]
    fn test_real_change_hides_buried_ore() {
        let mut world = world(&grid(1));
        let center = ChunkPos::new(0, 0);
        world.obfuscate(center).unwrap();

        let pos = BlockPos::new(15, 8, 15);
        world.set_real_block(pos, ORE).unwrap();
        assert_eq!(world.real_block(pos), Some(ORE));
        assert_eq!(world.fake_block(pos).unwrap(), STONE);
        // The refreshed box may resend stone, never the ore.
        assert!(world
            .drain_all_changes()
            .iter()
            .all(|change| change.state == STONE));

        // Opening the block above exposes the ore.
        world.set_real_block(pos.offset(0, 1, 0), BlockState::AIR).unwrap();
        assert_eq!(world.fake_block(pos).unwrap(), ORE);
        let changes = world.drain_changes(center);
        assert!(changes.contains(&BlockChange { pos, state: ORE }));
        assert!(changes.contains(&BlockChange {
            pos: pos.offset(0, 1, 0),
            state: BlockState::AIR
        }));
    }

    #[test]
    fn test_real_change_reaches_obfuscated_neighbor() {
        let mut world = world(&grid(2));
        let east = ChunkPos::new(1, 0);
        world.obfuscate(east).unwrap();

        let ore = BlockPos::new(16, 8, 4);
        world.set_real_block(ore, ORE).unwrap();
        assert_eq!(world.fake_block(ore).unwrap(), STONE);

        // Digging next to it from the unobfuscated column reveals it.
        world.set_real_block(BlockPos::new(15, 8, 4), BlockState::AIR).unwrap();
        assert_eq!(world.fake_block(ore).unwrap(), ORE);
        assert_eq!(world.fake_block(BlockPos::new(15, 8, 4)).unwrap(), BlockState::AIR);
    }

    #[test]
    fn test_unobfuscated_chunk_mirrors() {
        let mut world = world(&grid(1));
        let pos = BlockPos::new(3, 3, 3);
        world.set_real_block(pos, ORE).unwrap();
        assert_eq!(world.fake_block(pos).unwrap(), ORE);
        assert_eq!(
            world.drain_all_changes(),
            vec![BlockChange { pos, state: ORE }]
        );
    }

    #[test]
    fn test_area_ops_are_all_or_nothing() {
        let mut world = world(&[ChunkPos::new(0, 0), ChunkPos::new(1, 0)]);
        let min = BlockPos::new(10, 0, 0);
        let max = BlockPos::new(40, 5, 5);
        assert_matches!(
            world.deobfuscate_area(min, max, false),
            Err(UmbraError::ChunkNotLoaded(ChunkPos { x: 2, z: 0 }))
        );
        assert_eq!(world.deobfuscate_area(min, max, true).unwrap(), 0);

        assert_matches!(
            world.reobfuscate_area(min, BlockPos::new(20, 5, 5), false),
            Err(UmbraError::IllegalState(_))
        );
        assert!(world.reobfuscate_area(min, BlockPos::new(20, 5, 5), true).is_ok());

        assert_matches!(
            world.deobfuscate_area(BlockPos::new(0, -1, 0), BlockPos::new(1, 1, 1), true),
            Err(UmbraError::PositionOutOfBounds { y: -1, .. })
        );
    }

    #[test]
    fn test_area_spans_columns() {
        let mut world = world(&grid(2));
        for pos in grid(1) {
            world.obfuscate(pos).unwrap();
        }
        let properties = world.properties().clone();
        for x in [14, 15, 16, 17] {
            world
                .real_mut()
                .set_block(&properties, BlockPos::new(x, 8, 8), ORE)
                .unwrap();
        }
        // Real data changed without notification, so only the area pass
        // brings the shadow up to date.
        world
            .reobfuscate_area(BlockPos::new(14, 8, 8), BlockPos::new(17, 8, 8), false)
            .unwrap();
        for x in [14, 15, 16, 17] {
            assert_eq!(world.fake_block(BlockPos::new(x, 8, 8)).unwrap(), STONE);
        }
        let restored = world
            .deobfuscate_area(BlockPos::new(17, 8, 8), BlockPos::new(14, 8, 8), false)
            .unwrap();
        assert_eq!(restored, 4);
    }

    #[test]
    fn test_restore_requires_matching_real_data() {
        let mut world = world(&grid(1));
        let center = ChunkPos::new(0, 0);
        world.set_real_block(BlockPos::new(5, 5, 5), ORE).unwrap();
        world.obfuscate(center).unwrap();
        assert_eq!(world.dirty_chunks(), vec![center]);
        let bytes = world.serialize_chunk(center).unwrap();
        assert!(world.dirty_chunks().is_empty());

        world.on_chunk_unloaded(center);
        assert!(world.restore_chunk(center, &bytes).unwrap());
        assert_eq!(world.state(center), Some(ObfuscationState::Obfuscated));
        assert_eq!(world.fake_block(BlockPos::new(5, 5, 5)).unwrap(), STONE);

        world.on_chunk_unloaded(center);
        let properties = world.properties().clone();
        world
            .real_mut()
            .set_block(&properties, BlockPos::new(1, 1, 1), BlockState::AIR)
            .unwrap();
        assert!(!world.restore_chunk(center, &bytes).unwrap());
        assert!(world.chunk(center).is_none());
    }

    #[test]
    fn test_errors_for_missing_chunks() {
        let mut world = world(&[ChunkPos::new(0, 0)]);
        let far = ChunkPos::new(5, 5);
        assert_matches!(world.obfuscate(far), Err(UmbraError::ChunkNotLoaded(_)));
        assert_matches!(world.on_chunk_loaded(far), Err(UmbraError::ChunkNotLoaded(_)));
        assert_matches!(
            world.fake_block(BlockPos::new(80, 0, 80)),
            Err(UmbraError::ChunkNotLoaded(_))
        );
        assert_matches!(
            world.on_real_block_changed(BlockPos::new(0, 99, 0)),
            Err(UmbraError::PositionOutOfBounds { .. })
        );
        assert_matches!(
            world.serialize_chunk(ChunkPos::new(0, 0)),
            Err(UmbraError::IllegalState(_))
        );
    }
}
