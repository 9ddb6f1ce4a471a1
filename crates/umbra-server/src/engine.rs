use crate::config::EngineConfig;
use crate::observer::{chunks_around, ObserverManager, ObserverSession};
use std::collections::HashSet;
use std::sync::Arc;
use umbra_cache::{CacheStore, MemoryStore, ObfuscationCache, RegionStore};
use umbra_common::{BlockPos, BlockRegistry, BlockState, ChunkPos, Position, Result, UmbraError};
use umbra_logger::{log, LogSeverity};
use umbra_shadow::{
    BlockChange, DynamismChange, ModifierPipeline, ObfuscationState, RealColumn, RealView,
    RealWorld, ShadowWorld,
};
use uuid::Uuid;

/// What one observer must be sent after a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverSync {
    pub id: Uuid,
    /// Chunks that entered the view; send them whole from the fake view.
    pub entered: Vec<ChunkPos>,
    pub left: Vec<ChunkPos>,
    /// Real states of positions now in reach.
    pub reveal: Vec<(BlockPos, BlockState)>,
    /// Fake states of positions out of reach again.
    pub hide: Vec<(BlockPos, BlockState)>,
}

impl ObserverSync {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty()
            && self.left.is_empty()
            && self.reveal.is_empty()
            && self.hide.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncBatch {
    pub tick: u64,
    /// Fake view updates for everyone watching the chunk.
    pub blocks: Vec<BlockChange>,
    pub dynamism: Vec<DynamismChange>,
    pub observers: Vec<ObserverSync>,
}

/// Host facing facade: feeds world and observer events into the shadow world
/// and produces one [`SyncBatch`] per tick.
pub struct ShadowEngine {
    config: EngineConfig,
    world: ShadowWorld<RealWorld>,
    cache: Option<ObfuscationCache>,
    observers: ObserverManager,
    ticks: u64,
}

impl ShadowEngine {
    /// Caches to region files when the config names a directory and to
    /// memory otherwise. Must run inside a tokio runtime.
    pub fn new(config: EngineConfig, registry: Arc<BlockRegistry>) -> Result<Self> {
        let store: Arc<dyn CacheStore> = match &config.cache.directory {
            Some(directory) => Arc::new(RegionStore::open(directory)?),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_store(config, registry, Some(store))
    }

    pub fn with_store(
        config: EngineConfig,
        registry: Arc<BlockRegistry>,
        store: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self> {
        config.validate()?;
        let pipeline = ModifierPipeline::from_configs(&config.modifiers, &registry, &config.world)?;
        let names: Vec<&str> = pipeline.names().collect();
        log(
            format!(
                "Starting engine for world {} with modifiers [{}]",
                config.world.name,
                names.join(", ")
            ),
            LogSeverity::Info,
        );

        let real = RealWorld::new(registry.clone());
        let world = ShadowWorld::new(
            config.world.clone(),
            registry,
            real,
            pipeline,
            config.dynamism_enabled,
        )?;
        let cache = store.map(|store| {
            let signature = world.signature(config.cache.generation);
            log(format!("Cache signature {}", signature), LogSeverity::Debug);
            ObfuscationCache::new(signature, store)
        });
        Ok(Self {
            config,
            world,
            cache,
            observers: ObserverManager::new(),
            ticks: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn world(&self) -> &ShadowWorld<RealWorld> {
        &self.world
    }

    pub fn observers(&self) -> &ObserverManager {
        &self.observers
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Hands a real column to the engine. A cached view computed from the
    /// same real data is reused; anything else is a fresh deobfuscated view.
    pub async fn load_column(&mut self, pos: ChunkPos, column: RealColumn) -> Result<()> {
        if column.section_count() != self.world.properties().section_count() {
            return Err(UmbraError::IllegalState(format!(
                "column {} has {} sections, the world has {}",
                pos,
                column.section_count(),
                self.world.properties().section_count()
            )));
        }
        self.world.real_mut().insert_column(pos, column);

        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.read(pos).await {
                match self.world.restore_chunk(pos, &bytes) {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) => log(
                        format!("Discarding corrupt cached view of chunk {}: {}", pos, e),
                        LogSeverity::Warning,
                    ),
                }
            }
        }
        self.world.on_chunk_loaded(pos)
    }

    pub fn on_chunk_become_visible(&mut self, pos: ChunkPos) -> Result<ObfuscationState> {
        self.world.obfuscate(pos)
    }

    /// Saves the view if it changed, then drops both sides of the chunk.
    pub fn on_chunk_unload(&mut self, pos: ChunkPos) -> Result<()> {
        if !self.world.real().is_loaded(pos) {
            return Err(UmbraError::ChunkNotLoaded(pos));
        }
        let dirty = self.world.chunk(pos).map_or(false, |chunk| {
            chunk.state() == ObfuscationState::Obfuscated && chunk.is_dirty()
        });
        if dirty {
            self.save_chunk(pos);
        }
        self.world.on_chunk_unloaded(pos);
        self.world.real_mut().remove_column(pos);
        for session in self.observers.sessions_mut() {
            session.tracker.unwatch(pos);
        }
        Ok(())
    }

    pub fn on_real_block_changed(
        &mut self,
        pos: BlockPos,
        state: BlockState,
    ) -> Result<BlockState> {
        self.world.set_real_block(pos, state)
    }

    pub fn join(&mut self, name: &str, position: Position) -> Uuid {
        let session = ObserverSession::new(name.to_owned(), position);
        let id = session.id;
        if self.observers.add_session(session).is_some() {
            log(format!("Observer {} rejoined", name), LogSeverity::Debug);
        }
        id
    }

    pub fn leave(&mut self, id: Uuid) -> bool {
        self.observers.remove_session(id).is_some()
    }

    pub fn on_observer_moved(&mut self, id: Uuid, position: Position) -> Result<()> {
        let session = self
            .observers
            .get_session_mut(id)
            .ok_or_else(|| UmbraError::IllegalState(format!("unknown observer {}", id)))?;
        session.update_position(position);
        Ok(())
    }

    fn save_chunk(&mut self, pos: ChunkPos) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        match self.world.serialize_chunk(pos) {
            Ok(bytes) => {
                cache.write(pos, &bytes);
                true
            }
            Err(e) => {
                log(
                    format!("Failed to serialize chunk {}: {}", pos, e),
                    LogSeverity::Warning,
                );
                false
            }
        }
    }

    /// Queues every changed obfuscated view for saving.
    pub fn save_dirty(&mut self) -> usize {
        if self.cache.is_none() {
            return 0;
        }
        self.world
            .dirty_chunks()
            .into_iter()
            .filter(|pos| self.save_chunk(*pos))
            .count()
    }

    /// Brings every observer's view up to date.
    pub fn tick(&mut self) -> SyncBatch {
        self.ticks += 1;
        let view_distance = self.config.view_distance;

        let mut pending = Vec::with_capacity(self.observers.len());
        for session in self.observers.sessions_mut() {
            let current = session.watched();
            let mut entered = Vec::new();
            let mut desired = HashSet::new();
            for chunk in chunks_around(session.position.chunk(), view_distance) {
                if current.contains(&chunk) {
                    desired.insert(chunk);
                    continue;
                }
                let Some(before) = self.world.state(chunk) else {
                    continue;
                };
                match self.world.obfuscate(chunk) {
                    // Chunks still waiting for neighbours are not shown yet.
                    Ok(ObfuscationState::Obfuscated) => {
                        if before != ObfuscationState::Obfuscated {
                            self.world.clear_changes(chunk);
                        }
                        session.tracker.watch(chunk);
                        desired.insert(chunk);
                        entered.push(chunk);
                    }
                    Ok(_) => {}
                    Err(e) => log(
                        format!("Failed to obfuscate chunk {}: {}", chunk, e),
                        LogSeverity::Warning,
                    ),
                }
            }
            let mut left: Vec<ChunkPos> = current.difference(&desired).copied().collect();
            for chunk in &left {
                session.tracker.unwatch(*chunk);
            }
            entered.sort();
            left.sort();
            pending.push((session.id, entered, left));
        }

        let watched: HashSet<ChunkPos> = self
            .observers
            .sessions()
            .flat_map(|session| session.tracker.watched())
            .collect();
        let blocks: Vec<BlockChange> = self
            .world
            .drain_all_changes()
            .into_iter()
            .filter(|change| watched.contains(&change.pos.chunk()))
            .collect();
        let dynamism = self.world.drain_dynamism_changes();

        let properties = self.world.properties();
        let mut observers = Vec::with_capacity(pending.len());
        for (id, entered, left) in pending {
            let Some(session) = self.observers.get_session_mut(id) else {
                continue;
            };
            if session.moved || !entered.is_empty() || !left.is_empty() {
                session.tracker.update(&self.world, session.position);
                session.moved = false;
            } else {
                for change in &dynamism {
                    session
                        .tracker
                        .on_dynamism_changed(properties, change.pos, change.distance);
                }
            }
            let mut diff = session.tracker.get_changes(&self.world);
            session.tracker.apply_changes();

            // A broadcast fake state must not cover a block this observer
            // currently sees for real.
            for change in &blocks {
                if session.tracker.is_revealed(properties, change.pos)
                    && !diff.reveal.iter().any(|(pos, _)| *pos == change.pos)
                {
                    if let Some(real) = self.world.real_block(change.pos) {
                        diff.reveal.push((change.pos, real));
                    }
                }
            }

            let sync = ObserverSync {
                id,
                entered,
                left,
                reveal: diff.reveal,
                hide: diff.hide,
            };
            if !sync.is_empty() {
                observers.push(sync);
            }
        }
        observers.sort_by_key(|sync| sync.id);

        if self.ticks % self.config.cache.save_interval_ticks == 0 {
            let saved = self.save_dirty();
            log(
                format!(
                    "Tick {}: {} chunks, {} observers, {} views saved",
                    self.ticks,
                    self.world.len(),
                    self.observers.len(),
                    saved
                ),
                LogSeverity::Info,
            );
        }

        SyncBatch {
            tick: self.ticks,
            blocks,
            dynamism,
            observers,
        }
    }

    /// Saves every changed view and waits for the cache to write them.
    pub async fn flush(&mut self) {
        self.save_dirty();
        if let Some(cache) = &self.cache {
            cache.flush().await;
        }
    }

    pub async fn shutdown(mut self) {
        let saved = self.save_dirty();
        if let Some(cache) = self.cache.take() {
            cache.shutdown().await;
        }
        log(
            format!("Engine stopped, {} views saved on shutdown", saved),
            LogSeverity::Info,
        );
    }
}
