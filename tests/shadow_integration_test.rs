use std::sync::Arc;
use umbra::common::{BlockPos, BlockRegistry, ChunkPos, Position};
use umbra::server::demo_world::{generate_column, DemoPalette};
use umbra::shadow::{ModifierPipeline, ObfuscationState, RealColumn, RealView, RealWorld};
use umbra::{EngineConfig, ModifierConfig, ShadowEngine, ShadowWorld};

fn demo_columns(
    config: &EngineConfig,
    registry: &Arc<BlockRegistry>,
) -> Vec<(ChunkPos, RealColumn)> {
    let palette = DemoPalette::new(registry).unwrap();
    let mut columns = Vec::new();
    for x in -1..=1 {
        for z in -1..=1 {
            let pos = ChunkPos::new(x, z);
            let column = generate_column(registry, &palette, &config.world, pos).unwrap();
            columns.push((pos, column));
        }
    }
    columns
}

fn demo_world(modifiers: &[ModifierConfig]) -> ShadowWorld<RealWorld> {
    let config = EngineConfig::default();
    let registry = Arc::new(config.registry().unwrap());
    let mut real = RealWorld::new(registry.clone());
    for (pos, column) in demo_columns(&config, &registry) {
        real.insert_column(pos, column);
    }
    let pipeline = ModifierPipeline::from_configs(modifiers, &registry, &config.world).unwrap();
    let mut world = ShadowWorld::new(config.world.clone(), registry, real, pipeline, true).unwrap();
    for x in -1..=1 {
        for z in -1..=1 {
            world.on_chunk_loaded(ChunkPos::new(x, z)).unwrap();
        }
    }
    world
}

fn assert_fake_matches_real(world: &ShadowWorld<RealWorld>, chunk: ChunkPos) {
    let properties = world.properties();
    for y in (properties.min_y..properties.max_y()).step_by(7) {
        for x in 0..16 {
            for z in 0..16 {
                let pos = chunk.block(x, y, z);
                assert_eq!(
                    Some(world.fake_block(pos).unwrap()),
                    world.real().block(properties, pos),
                    "fake differs from real at {}",
                    pos
                );
            }
        }
    }
}

#[test]
fn test_empty_pipeline_is_identity() {
    let mut world = demo_world(&[ModifierConfig::Empty]);
    let center = ChunkPos::new(0, 0);
    assert_eq!(world.obfuscate(center).unwrap(), ObfuscationState::Obfuscated);
    assert!(world.drain_changes(center).is_empty());

    assert_eq!(world.deobfuscate(center).unwrap(), 0);
    assert_fake_matches_real(&world, center);
}

#[test]
fn test_deobfuscate_twice_emits_nothing() {
    let mut world = demo_world(&EngineConfig::default().modifiers);
    let center = ChunkPos::new(0, 0);
    world.obfuscate(center).unwrap();
    world.clear_changes(center);

    assert!(world.deobfuscate(center).unwrap() > 0);
    assert!(!world.drain_changes(center).is_empty());
    assert_fake_matches_real(&world, center);

    assert_eq!(world.deobfuscate(center).unwrap(), 0);
    assert!(world.drain_changes(center).is_empty());
}

#[test]
fn test_deep_ores_are_hidden() {
    let mut world = demo_world(&EngineConfig::default().modifiers);
    let center = ChunkPos::new(0, 0);
    world.obfuscate(center).unwrap();
    let registry = world.registry().clone();
    let diamond = registry.require("diamond_ore").unwrap();

    let properties = world.properties().clone();
    for y in properties.min_y..48 {
        for x in 0..16 {
            for z in 0..16 {
                let pos: BlockPos = center.block(x, y, z);
                if world.real_block(pos) == Some(diamond) && !world.is_exposed(pos) {
                    assert_ne!(world.fake_block(pos).unwrap(), diamond);
                }
            }
        }
    }
}

#[tokio::test]
async fn test_region_cache_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.view_distance = 1;
    config.cache.directory = Some(dir.path().to_path_buf());
    let registry = Arc::new(config.registry().unwrap());

    let mut engine = ShadowEngine::new(config.clone(), registry.clone()).unwrap();
    for (pos, column) in demo_columns(&config, &registry) {
        engine.load_column(pos, column).await.unwrap();
    }
    engine.join("digger", Position::new(8.0, 10.0, 8.0));
    let batch = engine.tick();
    assert_eq!(batch.observers[0].entered, vec![ChunkPos::new(0, 0)]);
    engine.shutdown().await;

    let mut engine = ShadowEngine::new(config.clone(), registry.clone()).unwrap();
    for (pos, column) in demo_columns(&config, &registry) {
        engine.load_column(pos, column).await.unwrap();
    }
    assert_eq!(engine.world().state(ChunkPos::new(0, 0)), Some(ObfuscationState::Obfuscated));
    engine.shutdown().await;
}
