use std::sync::Arc;
use umbra_common::types::{index_to_local, section_index};
use umbra_common::{BlockPos, BlockRegistry, BlockState, Result};
use umbra_storage::{ByteBuffer, DynamismTrack, PalettedSection, DYNAMISM_BYTES};

/// Receives the per cell notifications a section emits while it changes.
pub trait SectionSink {
    fn block_changed(&mut self, index: u16, state: BlockState);
    fn dynamism_changed(&mut self, index: u16, distance: u8);
}

/// Inclusive box of section local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionBox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl SectionBox {
    pub fn full() -> Self {
        Self {
            min: [0; 3],
            max: [15; 3],
        }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::full()
    }

    /// Section indices inside the box, `x` varying fastest.
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        let [min_x, min_y, min_z] = self.min;
        let [max_x, max_y, max_z] = self.max;
        (min_y..=max_y).flat_map(move |y| {
            (min_z..=max_z).flat_map(move |z| (min_x..=max_x).map(move |x| section_index(x, y, z)))
        })
    }
}

/// Squared reveal radius in 1/16 block units.
pub fn reveal_limit(distance: u8) -> i64 {
    let distance = distance as i64;
    distance * distance * 256
}

/// Observer position relative to one section, in 1/16 block fixed point.
#[derive(Debug, Clone, Copy)]
pub struct Proximity {
    observer: [i64; 3],
    origin: [i64; 3],
}

impl Proximity {
    /// `origin` is the lowest block of the section.
    pub fn new(observer: [i64; 3], origin: BlockPos) -> Self {
        Self {
            observer,
            origin: [origin.x as i64, origin.y as i64, origin.z as i64],
        }
    }

    /// Whether any block of the section may lie within `distance`.
    pub fn section_in_range(&self, distance: u8) -> bool {
        let squared: i64 = (0..3)
            .map(|axis| {
                let low = self.origin[axis] * 16;
                let high = low + 256;
                let observer = self.observer[axis];
                let gap = if observer < low {
                    low - observer
                } else if observer > high {
                    observer - high
                } else {
                    0
                };
                gap * gap
            })
            .sum();
        squared <= reveal_limit(distance)
    }

    /// Whether the centre of block `index` lies within `distance`.
    pub fn reveals(&self, index: u16, distance: u8) -> bool {
        let (x, y, z) = index_to_local(index as usize);
        let local = [x as i64, y as i64, z as i64];
        let squared: i64 = (0..3)
            .map(|axis| {
                let centre = (self.origin[axis] + local[axis]) * 16 + 8;
                let delta = centre - self.observer[axis];
                delta * delta
            })
            .sum();
        squared <= reveal_limit(distance)
    }
}

/// The observer facing copy of one section together with its reveal
/// distances.
#[derive(Debug, Clone)]
pub struct ShadowSection {
    fake: PalettedSection,
    dynamism: DynamismTrack,
    non_air_count: u16,
    dirty: bool,
}

impl ShadowSection {
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self {
            fake: PalettedSection::new(registry),
            dynamism: DynamismTrack::new(),
            non_air_count: 0,
            dirty: false,
        }
    }

    /// A shadow that starts out identical to `real`.
    pub fn mirror(real: &PalettedSection) -> Self {
        Self {
            non_air_count: real.count_non_air(),
            fake: real.clone(),
            dynamism: DynamismTrack::new(),
            dirty: false,
        }
    }

    pub fn fake(&self) -> &PalettedSection {
        &self.fake
    }

    pub fn dynamism(&self) -> &DynamismTrack {
        &self.dynamism
    }

    pub fn non_air_count(&self) -> u16 {
        self.non_air_count
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn get(&self, index: usize) -> BlockState {
        self.fake.get_at(index)
    }

    /// Writes a fake block. `state` must be registered.
    pub fn set_block(&mut self, index: usize, state: BlockState) -> bool {
        let previous = self.fake.set_at(index, state);
        if previous == state {
            return false;
        }
        let registry = self.fake.registry();
        match (registry.is_air(previous), registry.is_air(state)) {
            (true, false) => self.non_air_count += 1,
            (false, true) => self.non_air_count -= 1,
            _ => {}
        }
        self.dirty = true;
        true
    }

    pub fn set_dynamism(&mut self, index: usize, distance: u8) -> bool {
        let changed = self.dynamism.set_at(index, distance);
        self.dirty |= changed;
        changed
    }

    /// Restores real data over `area` (the whole section when `None`) and
    /// drops every reveal distance in it. Returns the number of cells whose
    /// fake value changed.
    pub fn deobfuscate(
        &mut self,
        real: Option<&PalettedSection>,
        area: Option<&SectionBox>,
        sink: &mut dyn SectionSink,
    ) -> usize {
        let full = area.map_or(true, SectionBox::is_full);
        let real_empty = real.map_or(true, PalettedSection::is_provably_empty);
        if full && real_empty && self.fake.is_provably_empty() && self.dynamism.is_clear() {
            return 0;
        }

        let area = area.copied().unwrap_or_else(SectionBox::full);
        let mut changed = 0;
        for index in area.indices() {
            let state = real.map_or(BlockState::AIR, |real| real.get_at(index));
            if self.fake.set_at(index, state) != state {
                sink.block_changed(index as u16, state);
                changed += 1;
            }
            if self.dynamism.set_at(index, 0) {
                sink.dynamism_changed(index as u16, 0);
                changed += 1;
            }
        }

        if changed > 0 {
            self.dirty = true;
        }
        if full || changed > 0 {
            self.non_air_count = self.fake.count_non_air();
        }
        changed
    }

    /// Feeds `(index, distance)` for every cell with a declared reveal
    /// distance, optionally only those within reach of an observer.
    pub fn collect_dynamic_positions<F>(&self, proximity: Option<&Proximity>, mut sink: F)
    where
        F: FnMut(u16, u8),
    {
        let max = self.dynamism.max_declared_distance();
        if max == 0 {
            return;
        }
        if let Some(proximity) = proximity {
            if !proximity.section_in_range(max) {
                return;
            }
        }
        for (index, distance) in self.dynamism.iter_declared() {
            if proximity.map_or(true, |proximity| proximity.reveals(index, distance)) {
                sink(index, distance);
            }
        }
    }

    /// `[fake section][2048 dynamism bytes]`.
    pub fn serialize(&self, buffer: &mut ByteBuffer) {
        self.fake.serialize(buffer);
        buffer.write_bytes_raw(self.dynamism.as_bytes());
    }

    /// Counters are recomputed from the raw data.
    pub fn deserialize(buffer: &mut ByteBuffer, registry: Arc<BlockRegistry>) -> Result<Self> {
        let fake = PalettedSection::deserialize(buffer, registry)?;
        let dynamism = DynamismTrack::from_bytes(buffer.read_bytes(DYNAMISM_BYTES)?)?;
        Ok(Self {
            non_air_count: fake.count_non_air(),
            fake,
            dynamism,
            dirty: false,
        })
    }

    /// True when the shadow carries nothing a fresh empty section would not.
    pub fn is_blank(&self) -> bool {
        self.non_air_count == 0 && self.dynamism.is_clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_common::types::SECTION_VOLUME;

    #[derive(Default)]
    struct Recorder {
        blocks: Vec<(u16, BlockState)>,
        dynamism: Vec<(u16, u8)>,
    }

    impl SectionSink for Recorder {
        fn block_changed(&mut self, index: u16, state: BlockState) {
            self.blocks.push((index, state));
        }

        fn dynamism_changed(&mut self, index: u16, distance: u8) {
            self.dynamism.push((index, distance));
        }
    }

    fn registry() -> Arc<BlockRegistry> {
        Arc::new(
            BlockRegistry::builder()
                .air("air")
                .opaque("stone")
                .opaque("diamond_ore")
                .transparent("glass")
                .build()
                .unwrap(),
        )
    }

    fn real_section(registry: &Arc<BlockRegistry>) -> PalettedSection {
        let mut real = PalettedSection::new(registry.clone());
        for index in 0..256 {
            real.set_at(index, BlockState(1));
        }
        real.set_at(section_index(4, 0, 4), BlockState(2));
        real
    }

    #[test]
    fn test_mirror_counts_blocks() {
        let registry = registry();
        let real = real_section(&registry);
        let shadow = ShadowSection::mirror(&real);
        assert_eq!(shadow.non_air_count(), 256);
        assert!(!shadow.is_dirty());
        assert_eq!(shadow.get(section_index(4, 0, 4)), BlockState(2));
    }

    #[test]
    fn test_set_block_tracks_air() {
        let mut shadow = ShadowSection::new(registry());
        assert!(shadow.set_block(0, BlockState(1)));
        assert!(!shadow.set_block(0, BlockState(1)));
        assert!(shadow.set_block(0, BlockState(3)));
        assert_eq!(shadow.non_air_count(), 1);
        assert!(shadow.set_block(0, BlockState::AIR));
        assert_eq!(shadow.non_air_count(), 0);
        assert!(shadow.is_dirty());
    }

    #[test]
    fn test_deobfuscate_twice_is_quiet() {
        let registry = registry();
        let real = real_section(&registry);
        let mut shadow = ShadowSection::mirror(&real);
        shadow.set_block(section_index(4, 0, 4), BlockState(1));
        shadow.set_block(section_index(8, 8, 8), BlockState(2));
        shadow.set_dynamism(section_index(8, 8, 8), 4);

        let mut first = Recorder::default();
        assert_eq!(shadow.deobfuscate(Some(&real), None, &mut first), 3);
        assert_eq!(first.blocks.len(), 2);
        assert!(first.blocks.contains(&(section_index(4, 0, 4) as u16, BlockState(2))));
        assert!(first.blocks.contains(&(section_index(8, 8, 8) as u16, BlockState::AIR)));
        assert_eq!(first.dynamism, vec![(section_index(8, 8, 8) as u16, 0)]);

        let mut second = Recorder::default();
        assert_eq!(shadow.deobfuscate(Some(&real), None, &mut second), 0);
        assert!(second.blocks.is_empty());
        assert!(second.dynamism.is_empty());
        for index in 0..SECTION_VOLUME {
            assert_eq!(shadow.get(index), real.get_at(index));
        }
        assert_eq!(shadow.non_air_count(), 256);
    }

    #[test]
    fn test_deobfuscate_area_only_touches_box() {
        let registry = registry();
        let real = real_section(&registry);
        let mut shadow = ShadowSection::mirror(&real);
        shadow.set_block(section_index(0, 0, 0), BlockState(3));
        shadow.set_block(section_index(9, 0, 9), BlockState(3));

        let area = SectionBox {
            min: [0, 0, 0],
            max: [1, 1, 1],
        };
        let mut recorder = Recorder::default();
        assert_eq!(shadow.deobfuscate(Some(&real), Some(&area), &mut recorder), 1);
        assert_eq!(shadow.get(section_index(0, 0, 0)), BlockState(1));
        assert_eq!(shadow.get(section_index(9, 0, 9)), BlockState(3));
    }

    #[test]
    fn test_deobfuscate_missing_real_clears_to_air() {
        let mut shadow = ShadowSection::new(registry());
        shadow.set_block(100, BlockState(2));
        let mut recorder = Recorder::default();
        assert_eq!(shadow.deobfuscate(None, None, &mut recorder), 1);
        assert_eq!(shadow.non_air_count(), 0);
        assert!(shadow.is_blank());

        let mut quiet = Recorder::default();
        assert_eq!(shadow.deobfuscate(None, None, &mut quiet), 0);
    }

    #[test]
    fn test_collect_dynamic_positions() {
        let mut shadow = ShadowSection::new(registry());
        let mut seen = Vec::new();
        shadow.collect_dynamic_positions(None, |index, distance| seen.push((index, distance)));
        assert!(seen.is_empty());

        let near = section_index(1, 0, 0);
        let far = section_index(15, 15, 15);
        shadow.set_dynamism(near, 2);
        shadow.set_dynamism(far, 2);
        shadow.collect_dynamic_positions(None, |index, distance| seen.push((index, distance)));
        assert_eq!(seen, vec![(near as u16, 2), (far as u16, 2)]);

        // Observer standing on the centre of block (0, 0, 0).
        let proximity = Proximity::new([8, 8, 8], BlockPos::new(0, 0, 0));
        seen.clear();
        shadow.collect_dynamic_positions(Some(&proximity), |index, distance| {
            seen.push((index, distance))
        });
        assert_eq!(seen, vec![(near as u16, 2)]);

        let away = Proximity::new([8, 8, 16 * 200], BlockPos::new(0, 0, 0));
        seen.clear();
        shadow.collect_dynamic_positions(Some(&away), |index, distance| {
            seen.push((index, distance))
        });
        assert!(seen.is_empty());
    }

    #[test]
    fn test_reveal_distance_math() {
        let origin = BlockPos::new(16, 32, -16);
        let observer = [16 * 16 + 8, 32 * 16 + 8, -16 * 16 + 8];
        let proximity = Proximity::new(observer, origin);
        assert!(proximity.reveals(section_index(1, 0, 0) as u16, 2));
        assert!(proximity.reveals(section_index(2, 0, 0) as u16, 2));
        assert!(!proximity.reveals(section_index(5, 0, 0) as u16, 2));
        assert!(!proximity.reveals(section_index(2, 1, 0) as u16, 2));
        assert_eq!(reveal_limit(2), 1024);
    }

    #[test]
    fn test_serialize_recomputes_counters() {
        let registry = registry();
        let mut shadow = ShadowSection::mirror(&real_section(&registry));
        shadow.set_dynamism(77, 9);

        let mut buffer = ByteBuffer::new();
        shadow.serialize(&mut buffer);
        let mut read = ByteBuffer::from_bytes(buffer.into_inner());
        let restored = ShadowSection::deserialize(&mut read, registry).unwrap();
        assert_eq!(read.remaining(), 0);
        assert_eq!(restored.non_air_count(), 256);
        assert_eq!(restored.dynamism().count(9), 1);
        assert_eq!(restored.dynamism().get_at(77), 9);
        assert!(!restored.is_dirty());
    }
}
