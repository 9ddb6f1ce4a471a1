#![allow(dead_code)]

use std::sync::Arc;
use umbra_common::{BlockPos, BlockRegistry, BlockState, ChunkPos, WorldProperties};
use umbra_shadow::{ModifierConfig, ModifierPipeline, RealColumn, RealView, RealWorld, ShadowWorld};

pub const AIR: BlockState = BlockState(0);
pub const STONE: BlockState = BlockState(1);
pub const GLASS: BlockState = BlockState(2);
pub const DIAMOND_ORE: BlockState = BlockState(3);

pub fn registry() -> Arc<BlockRegistry> {
    Arc::new(
        BlockRegistry::builder()
            .air("air")
            .opaque("stone")
            .transparent("glass")
            .opaque("diamond_ore")
            .build()
            .unwrap(),
    )
}

/// Two sections tall, starting at y = 0.
pub fn properties() -> WorldProperties {
    WorldProperties::new("overworld", 42, 0, 32)
}

/// A column whose lowest section is solid stone.
pub fn stone_column(registry: &Arc<BlockRegistry>, properties: &WorldProperties) -> RealColumn {
    let mut column = RealColumn::new(properties.section_count());
    for index in 0..4096 {
        column.set(registry, 0, index, STONE).unwrap();
    }
    column
}

pub fn hide_and_reveal() -> Vec<ModifierConfig> {
    vec![
        ModifierConfig::HideOres {
            hidden: vec!["diamond_ore".into()],
            replacement: "stone".into(),
        },
        ModifierConfig::ProximityReveal {
            targets: vec!["diamond_ore".into()],
            distance: 3,
        },
    ]
}

/// Real world with stone columns at every given chunk and ore placed at
/// `ores`. Columns are only added to the real side; shadow chunks are not
/// loaded yet.
pub fn world(
    chunks: &[ChunkPos],
    ores: &[BlockPos],
    configs: &[ModifierConfig],
) -> ShadowWorld<RealWorld> {
    let registry = registry();
    let properties = properties();
    let mut real = RealWorld::new(registry.clone());
    for chunk in chunks {
        real.insert_column(*chunk, stone_column(&registry, &properties));
    }
    for ore in ores {
        real.set_block(&properties, *ore, DIAMOND_ORE).unwrap();
    }
    let pipeline = ModifierPipeline::from_configs(configs, &registry, &properties).unwrap();
    ShadowWorld::new(properties, registry, real, pipeline, true).unwrap()
}

/// The chunk at the origin and its four neighbours.
pub fn plus_shape() -> Vec<ChunkPos> {
    let center = ChunkPos::new(0, 0);
    let mut chunks = vec![center];
    chunks.extend(center.neighbors());
    chunks
}
