use crate::real::RealView;
use umbra_common::{BlockPos, BlockRegistry, ChunkPos, WorldProperties};

const FACES: [(i32, i32, i32); 6] = [
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
];

/// A block is exposed when any face neighbour is see-through in the real
/// world. Neighbours in unloaded chunks or outside the world count as
/// see-through.
pub fn is_exposed(
    real: &dyn RealView,
    registry: &BlockRegistry,
    properties: &WorldProperties,
    pos: BlockPos,
) -> bool {
    FACES.iter().any(|(dx, dy, dz)| {
        real.block(properties, pos.offset(*dx, *dy, *dz))
            .map_or(true, |state| !registry.is_opaque(state))
    })
}

/// Whether all four lateral neighbours of `chunk` are loaded.
pub fn are_neighbors_loaded(real: &dyn RealView, chunk: ChunkPos) -> bool {
    chunk.neighbors().iter().all(|neighbor| real.is_loaded(*neighbor))
}
