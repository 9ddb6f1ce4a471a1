#![allow(dead_code)]

use std::sync::Arc;
use umbra_cache::CacheStore;
use umbra_common::types::section_index;
use umbra_common::{BlockPos, BlockRegistry, BlockState, ChunkPos, WorldProperties};
use umbra_server::config::{EngineConfig, DEFAULT_BLOCKS};
use umbra_server::ShadowEngine;
use umbra_shadow::{ModifierConfig, RealColumn};

pub const AIR: BlockState = BlockState(0);
pub const STONE: BlockState = BlockState(1);
pub const DIAMOND_ORE: BlockState = BlockState(26);

/// Buried ore in the centre chunk.
pub const ORE: BlockPos = BlockPos::new(8, 6, 8);

pub fn registry() -> Arc<BlockRegistry> {
    Arc::new(BlockRegistry::from_json(DEFAULT_BLOCKS).unwrap())
}

pub fn config(generation: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.world = WorldProperties::new("test", 1234, 0, 32);
    config.view_distance = 1;
    config.cache.generation = generation;
    config.modifiers = vec![
        ModifierConfig::HideOres {
            hidden: vec!["diamond_ore".into()],
            replacement: "stone".into(),
        },
        ModifierConfig::ProximityReveal {
            targets: vec!["diamond_ore".into()],
            distance: 3,
        },
    ];
    config
}

/// Solid stone up to y 15 with air above, plus the given ores.
pub fn column(registry: &Arc<BlockRegistry>, pos: ChunkPos, ores: &[BlockPos]) -> RealColumn {
    let mut column = RealColumn::new(2);
    for index in 0..4096 {
        column.set(registry, 0, index, STONE).unwrap();
    }
    for ore in ores.iter().filter(|ore| ore.chunk() == pos) {
        let index = section_index(ore.local_x(), ore.y as usize, ore.local_z());
        column.set(registry, 0, index, DIAMOND_ORE).unwrap();
    }
    column
}

/// A 3x3 block of chunks around the origin with one buried ore.
pub async fn engine(generation: u64, store: Option<Arc<dyn CacheStore>>) -> ShadowEngine {
    engine_with_ores(generation, store, &[ORE]).await
}

pub async fn engine_with_ores(
    generation: u64,
    store: Option<Arc<dyn CacheStore>>,
    ores: &[BlockPos],
) -> ShadowEngine {
    let registry = registry();
    let mut engine = ShadowEngine::with_store(config(generation), registry.clone(), store).unwrap();
    for x in -1..=1 {
        for z in -1..=1 {
            let pos = ChunkPos::new(x, z);
            engine
                .load_column(pos, column(&registry, pos, ores))
                .await
                .unwrap();
        }
    }
    engine
}
