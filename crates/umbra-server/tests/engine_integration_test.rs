mod common;

use assert_matches::assert_matches;
use common::*;
use std::sync::Arc;
use umbra_cache::{CacheStore, MemoryStore};
use umbra_common::{BlockPos, ChunkPos, Position, UmbraError};
use umbra_server::ShadowEngine;
use umbra_shadow::{BlockChange, ObfuscationState, RealColumn};
use uuid::Uuid;

const CENTER: ChunkPos = ChunkPos::new(0, 0);
const FAR: Position = Position::new(8.5, 28.0, 8.5);
const NEAR: Position = Position::new(8.5, 8.5, 8.5);

#[tokio::test]
async fn test_observer_only_sees_obfuscated_chunks() {
    let mut engine = engine(0, None).await;
    let id = engine.join("watcher", FAR);

    let batch = engine.tick();
    assert_eq!(batch.tick, 1);
    assert_eq!(batch.observers.len(), 1);
    let sync = &batch.observers[0];
    assert_eq!(sync.id, id);
    // Border chunks lack neighbours and stay hidden from the observer.
    assert_eq!(sync.entered, vec![CENTER]);
    assert!(sync.reveal.is_empty());
    assert!(batch.blocks.is_empty());

    assert_eq!(engine.world().fake_block(ORE).unwrap(), STONE);
    assert_eq!(
        engine.world().state(ChunkPos::new(1, 1)),
        Some(ObfuscationState::ObfuscationRequested)
    );
}

#[tokio::test]
async fn test_walking_past_ore() {
    let mut engine = engine(0, None).await;
    let id = engine.join("walker", FAR);
    engine.tick();

    engine.on_observer_moved(id, NEAR).unwrap();
    let batch = engine.tick();
    assert_eq!(batch.observers[0].reveal, vec![(ORE, DIAMOND_ORE)]);

    let batch = engine.tick();
    assert!(batch.observers.is_empty());

    engine.on_observer_moved(id, FAR).unwrap();
    let batch = engine.tick();
    assert_eq!(batch.observers[0].hide, vec![(ORE, STONE)]);
}

#[tokio::test]
async fn test_broadcast_does_not_cover_revealed_block() {
    let mut engine = engine(0, None).await;
    let id = engine.join("miner", NEAR);
    engine.tick();
    assert!(engine.observers().get_session(id).unwrap().tracker.is_revealed(
        engine.world().properties(),
        ORE
    ));

    // Diagonal to the ore, which stays buried and gets hidden again.
    let dug = BlockPos::new(9, 7, 8);
    engine.on_real_block_changed(dug, AIR).unwrap();
    let batch = engine.tick();

    assert!(batch.blocks.contains(&BlockChange { pos: dug, state: AIR }));
    assert!(batch.blocks.contains(&BlockChange { pos: ORE, state: STONE }));
    let sync = &batch.observers[0];
    assert!(sync.reveal.contains(&(ORE, DIAMOND_ORE)));
}

#[tokio::test]
async fn test_exposing_ore_broadcasts_it() {
    let mut engine = engine(0, None).await;
    engine.join("miner", FAR);
    engine.tick();

    let above = ORE.offset(0, 1, 0);
    engine.on_real_block_changed(above, AIR).unwrap();
    let batch = engine.tick();
    assert_eq!(engine.world().fake_block(ORE).unwrap(), DIAMOND_ORE);
    assert!(batch.blocks.contains(&BlockChange {
        pos: ORE,
        state: DIAMOND_ORE
    }));
}

#[tokio::test]
async fn test_cached_views_survive_restart() {
    let store = Arc::new(MemoryStore::new());
    let shared = || Some(store.clone() as Arc<dyn CacheStore>);

    let mut first = engine(0, shared()).await;
    first.join("watcher", FAR);
    first.tick();
    first.flush().await;
    assert_eq!(store.len(), 1);
    first.shutdown().await;

    let second = engine(0, shared()).await;
    assert_eq!(second.world().state(CENTER), Some(ObfuscationState::Obfuscated));
    assert_eq!(second.world().fake_block(ORE).unwrap(), STONE);
    second.shutdown().await;

    // A new generation changes the signature, so the view is rebuilt.
    let third = engine(1, shared()).await;
    assert_eq!(third.world().state(CENTER), Some(ObfuscationState::Deobfuscated));
}

#[tokio::test]
async fn test_unload_saves_changed_view() {
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(0, Some(store.clone() as Arc<dyn CacheStore>)).await;
    let id = engine.join("watcher", FAR);
    engine.tick();

    engine.on_chunk_unload(CENTER).unwrap();
    engine.flush().await;
    assert_eq!(store.len(), 1);
    assert!(engine.world().chunk(CENTER).is_none());
    assert!(!engine.observers().get_session(id).unwrap().tracker.is_watching(CENTER));
    assert_matches!(engine.on_chunk_unload(CENTER), Err(UmbraError::ChunkNotLoaded(_)));
}

#[tokio::test]
async fn test_unchanged_view_is_still_cached() {
    let store = Arc::new(MemoryStore::new());
    let shared = || Some(store.clone() as Arc<dyn CacheStore>);

    let mut first = engine_with_ores(0, shared(), &[]).await;
    first.join("watcher", FAR);
    first.tick();
    assert_eq!(first.world().state(CENTER), Some(ObfuscationState::Obfuscated));
    first.on_chunk_unload(CENTER).unwrap();
    first.flush().await;
    assert_eq!(store.len(), 1);
    first.shutdown().await;

    let second = engine_with_ores(0, shared(), &[]).await;
    assert_eq!(second.world().state(CENTER), Some(ObfuscationState::Obfuscated));
}

#[tokio::test]
async fn test_rejects_bad_input() {
    let registry = registry();
    let mut engine = ShadowEngine::with_store(config(0), registry, None).unwrap();
    assert_matches!(engine.on_observer_moved(Uuid::nil(), FAR), Err(UmbraError::IllegalState(_)));
    assert_matches!(
        engine.load_column(CENTER, RealColumn::new(5)).await,
        Err(UmbraError::IllegalState(_))
    );
    assert!(!engine.leave(Uuid::nil()));
}
