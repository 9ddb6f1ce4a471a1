use crate::config::EngineConfig;
use crate::demo_world::{generate_column, DemoPalette};
use crate::engine::ShadowEngine;
use crate::observer::chunks_around;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::time::{self, Duration};
use umbra_common::{BlockState, ChunkPos, Position, Result};
use umbra_logger::{log, LogSeverity::*};
use uuid::Uuid;

/// Radius in chunks of the synthetic world around spawn.
const WORLD_RADIUS: u32 = 6;
const OBSERVERS: usize = 3;
const STATS_EVERY_TICKS: u64 = 200;

struct Wanderer {
    id: Uuid,
    position: Position,
    heading: f64,
}

/// Builds the synthetic world, then drives the engine on a fixed tick until
/// ctrl-c.
pub async fn run(config: EngineConfig) -> Result<()> {
    let registry = Arc::new(config.registry()?);
    let palette = DemoPalette::new(&registry)?;
    let properties = config.world.clone();
    let tick = Duration::from_millis(config.tick_millis);
    let mut engine = ShadowEngine::new(config, registry.clone())?;

    let mut chunks: Vec<ChunkPos> = chunks_around(ChunkPos::new(0, 0), WORLD_RADIUS)
        .into_iter()
        .collect();
    chunks.sort();
    for pos in &chunks {
        let column = generate_column(&registry, &palette, &properties, *pos)?;
        engine.load_column(*pos, column).await?;
    }
    log(format!("Generated {} chunks", chunks.len()), Info);

    let mut rng = StdRng::seed_from_u64(properties.seed);
    let mut wanderers: Vec<Wanderer> = (0..OBSERVERS)
        .map(|i| {
            let position = Position::new(8.0 + 16.0 * i as f64, 20.0, 8.0);
            Wanderer {
                id: engine.join(&format!("wanderer-{}", i), position),
                position,
                heading: rng.gen_range(0.0..std::f64::consts::TAU),
            }
        })
        .collect();

    let limit = (WORLD_RADIUS * 16) as f64;
    let mut interval = time::interval(tick);
    let mut sent = 0usize;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => break,
        }

        for wanderer in &mut wanderers {
            wanderer.heading += rng.gen_range(-0.3..0.3);
            let mut x = wanderer.position.x + wanderer.heading.cos() * 0.5;
            let mut z = wanderer.position.z + wanderer.heading.sin() * 0.5;
            if x.abs() > limit || z.abs() > limit {
                wanderer.heading += std::f64::consts::PI;
                x = x.clamp(-limit, limit);
                z = z.clamp(-limit, limit);
            }
            wanderer.position = Position::new(x, wanderer.position.y, z);
            engine.on_observer_moved(wanderer.id, wanderer.position)?;

            // Dig the block in front of the observer now and then.
            if rng.gen_bool(0.05) {
                let target = wanderer.position.block().offset(1, 0, 0);
                if let Err(e) = engine.on_real_block_changed(target, BlockState::AIR) {
                    log(format!("Failed to dig at {}: {}", target, e), Warning);
                }
            }
        }

        let batch = engine.tick();
        sent += batch.blocks.len()
            + batch
                .observers
                .iter()
                .map(|sync| sync.reveal.len() + sync.hide.len())
                .sum::<usize>();
        if batch.tick % STATS_EVERY_TICKS == 0 {
            log(
                format!("Tick {}: {} block updates sent so far", batch.tick, sent),
                Debug,
            );
        }
    }

    log("Shutting down".to_owned(), Info);
    engine.shutdown().await;
    Ok(())
}
