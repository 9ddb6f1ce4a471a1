use crate::chunk::ShadowChunk;
use crate::real::RealView;
use crate::section::Proximity;
use crate::world::ShadowWorld;
use std::collections::{BTreeMap, HashMap, HashSet};
use umbra_common::types::{index_to_local, section_index};
use umbra_common::{BlockPos, BlockState, ChunkPos, Position, WorldProperties};
use uuid::Uuid;

/// Revealed positions of one section, keyed by section index.
#[derive(Debug, Default)]
struct SectionSets {
    next: HashSet<u16>,
    current: HashSet<u16>,
}

#[derive(Debug, Default)]
struct WatchedChunk {
    sections: BTreeMap<usize, SectionSets>,
}

/// Blocks to send to one observer: `reveal` carries real states, `hide`
/// carries fake states.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VisibilityChanges {
    pub reveal: Vec<(BlockPos, BlockState)>,
    pub hide: Vec<(BlockPos, BlockState)>,
}

impl VisibilityChanges {
    pub fn is_empty(&self) -> bool {
        self.reveal.is_empty() && self.hide.is_empty()
    }
}

fn block_pos(
    chunk: ChunkPos,
    properties: &WorldProperties,
    section: usize,
    index: u16,
) -> BlockPos {
    let (x, y, z) = index_to_local(index as usize);
    chunk.block(x, properties.section_base_y(section) + y as i32, z)
}

/// Tracks which dynamically revealed blocks one observer currently sees in
/// their real form.
#[derive(Debug)]
pub struct DynamicVisibilityTracker {
    observer: Uuid,
    position: Option<[i64; 3]>,
    watched: HashMap<ChunkPos, WatchedChunk>,
}

impl DynamicVisibilityTracker {
    pub fn new(observer: Uuid) -> Self {
        Self {
            observer,
            position: None,
            watched: HashMap::new(),
        }
    }

    pub fn observer(&self) -> Uuid {
        self.observer
    }

    pub fn watch(&mut self, chunk: ChunkPos) {
        self.watched.entry(chunk).or_default();
    }

    /// Forgets a chunk the observer no longer receives.
    pub fn unwatch(&mut self, chunk: ChunkPos) {
        self.watched.remove(&chunk);
    }

    pub fn is_watching(&self, chunk: ChunkPos) -> bool {
        self.watched.contains_key(&chunk)
    }

    pub fn watched(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.watched.keys().copied()
    }

    /// Whether `pos` is currently shown in real form.
    pub fn is_revealed(&self, properties: &WorldProperties, pos: BlockPos) -> bool {
        let Some(section) = properties.section_of(pos.y) else {
            return false;
        };
        let local_y = (pos.y - properties.section_base_y(section)) as usize;
        let index = section_index(pos.local_x(), local_y, pos.local_z()) as u16;
        self.watched
            .get(&pos.chunk())
            .and_then(|watched| watched.sections.get(&section))
            .map_or(false, |sets| sets.current.contains(&index))
    }

    fn refresh_chunk(&mut self, chunk: &ShadowChunk, properties: &WorldProperties) {
        let Some(watched) = self.watched.get_mut(&chunk.pos()) else {
            return;
        };
        for sets in watched.sections.values_mut() {
            sets.next.clear();
        }
        let Some(observer) = self.position else {
            return;
        };
        chunk.collect_dynamic_positions(properties, Some(observer), |section, index, _| {
            watched.sections.entry(section).or_default().next.insert(index);
        });
    }

    /// Recomputes the positions in reach of the observer at `position`.
    pub fn update<R: RealView>(&mut self, world: &ShadowWorld<R>, position: Position) {
        self.position = Some(position.scaled());
        let chunks: Vec<ChunkPos> = self.watched.keys().copied().collect();
        for pos in chunks {
            match world.chunk(pos) {
                Some(chunk) => self.refresh_chunk(chunk, world.properties()),
                None => {
                    if let Some(watched) = self.watched.get_mut(&pos) {
                        for sets in watched.sections.values_mut() {
                            sets.next.clear();
                        }
                    }
                }
            }
        }
    }

    /// Re-evaluates one position whose declared reveal distance changed,
    /// without waiting for the next full update.
    pub fn on_dynamism_changed(
        &mut self,
        properties: &WorldProperties,
        pos: BlockPos,
        distance: u8,
    ) {
        let Some(section) = properties.section_of(pos.y) else {
            return;
        };
        let Some(watched) = self.watched.get_mut(&pos.chunk()) else {
            return;
        };
        let base = properties.section_base_y(section);
        let index = section_index(pos.local_x(), (pos.y - base) as usize, pos.local_z()) as u16;
        let origin = pos.chunk().block(0, base, 0);
        let in_reach = distance > 0
            && self.position.map_or(false, |observer| {
                Proximity::new(observer, origin).reveals(index, distance)
            });

        let sets = watched.sections.entry(section).or_default();
        if in_reach {
            sets.next.insert(index);
        } else {
            sets.next.remove(&index);
        }
    }

    /// Diff between what the observer should see and what it was last sent.
    pub fn get_changes<R: RealView>(&self, world: &ShadowWorld<R>) -> VisibilityChanges {
        let properties = world.properties();
        let mut changes = VisibilityChanges::default();
        for (chunk, watched) in &self.watched {
            for (section, sets) in &watched.sections {
                for index in sets.next.difference(&sets.current) {
                    let pos = block_pos(*chunk, properties, *section, *index);
                    if let Some(state) = world.real_block(pos) {
                        changes.reveal.push((pos, state));
                    }
                }
                for index in sets.current.difference(&sets.next) {
                    let pos = block_pos(*chunk, properties, *section, *index);
                    if let Ok(state) = world.fake_block(pos) {
                        changes.hide.push((pos, state));
                    }
                }
            }
        }
        changes.reveal.sort_by_key(|(pos, _)| *pos);
        changes.hide.sort_by_key(|(pos, _)| *pos);
        changes
    }

    /// Records that the last diff was delivered.
    pub fn apply_changes(&mut self) {
        for watched in self.watched.values_mut() {
            watched.sections.retain(|_, sets| {
                sets.current.clone_from(&sets.next);
                !sets.current.is_empty()
            });
        }
    }

    /// Number of positions currently shown in real form.
    pub fn revealed_count(&self) -> usize {
        self.watched
            .values()
            .flat_map(|watched| watched.sections.values())
            .map(|sets| sets.current.len())
            .sum()
    }
}
