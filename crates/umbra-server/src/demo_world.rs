use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use umbra_common::types::{index_to_local, SECTION_VOLUME};
use umbra_common::{BlockRegistry, BlockState, ChunkPos, Result, WorldProperties};
use umbra_shadow::{chunk_seed, RealColumn};

/// Block states used by the synthetic terrain.
pub struct DemoPalette {
    bedrock: BlockState,
    deepslate: BlockState,
    stone: BlockState,
    dirt: BlockState,
    grass: BlockState,
    water: BlockState,
    cave_air: BlockState,
    /// `(state, highest y, chance per block)`.
    ores: Vec<(BlockState, i32, f64)>,
}

impl DemoPalette {
    pub fn new(registry: &BlockRegistry) -> Result<Self> {
        Ok(Self {
            bedrock: registry.require("bedrock")?,
            deepslate: registry.require("deepslate")?,
            stone: registry.require("stone")?,
            dirt: registry.require("dirt")?,
            grass: registry.require("grass_block")?,
            water: registry.require("water")?,
            cave_air: registry.require("cave_air")?,
            ores: vec![
                (registry.require("deepslate_diamond_ore")?, 0, 0.002),
                (registry.require("diamond_ore")?, 16, 0.002),
                (registry.require("gold_ore")?, 32, 0.003),
                (registry.require("redstone_ore")?, 16, 0.004),
                (registry.require("iron_ore")?, 64, 0.008),
                (registry.require("coal_ore")?, 96, 0.012),
            ],
        })
    }
}

const SEA_LEVEL: i32 = 62;

fn surface_height(world_seed: u64, x: i32, z: i32) -> i32 {
    let phase = (world_seed % 628) as f64 / 100.0;
    let wave = (x as f64 / 23.0 + phase).sin() * 6.0 + (z as f64 / 17.0 - phase).cos() * 4.0;
    64 + wave.round() as i32
}

/// Layered terrain: bedrock floor, deepslate below y 0, stone with ore
/// veins and a few cave pockets, a dirt and grass top, water up to sea
/// level.
pub fn generate_column(
    registry: &Arc<BlockRegistry>,
    palette: &DemoPalette,
    properties: &WorldProperties,
    pos: ChunkPos,
) -> Result<RealColumn> {
    let mut rng = StdRng::seed_from_u64(chunk_seed(properties.seed ^ 0xD3E0, pos));
    let mut column = RealColumn::new(properties.section_count());
    let mut heights = [[0i32; 16]; 16];
    for (x, row) in heights.iter_mut().enumerate() {
        for (z, height) in row.iter_mut().enumerate() {
            let block = pos.block(x, 0, z);
            *height = surface_height(properties.seed, block.x, block.z);
        }
    }

    for section in 0..properties.section_count() {
        let base_y = properties.section_base_y(section);
        for index in 0..SECTION_VOLUME {
            let (x, local_y, z) = index_to_local(index);
            let y = base_y + local_y as i32;
            let surface = heights[x][z];
            let state = if y == properties.min_y {
                palette.bedrock
            } else if y > surface {
                if y <= SEA_LEVEL {
                    palette.water
                } else {
                    continue;
                }
            } else if y == surface {
                palette.grass
            } else if y > surface - 4 {
                palette.dirt
            } else if rng.gen_bool(0.01) {
                palette.cave_air
            } else {
                let host = if y < 0 { palette.deepslate } else { palette.stone };
                palette
                    .ores
                    .iter()
                    .find(|(_, max_y, chance)| y <= *max_y && rng.gen_bool(*chance))
                    .map_or(host, |(ore, _, _)| *ore)
            };
            column.set(registry, section, index, state)?;
        }
    }
    Ok(column)
}
