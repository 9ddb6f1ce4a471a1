use std::collections::HashMap;
use umbra_common::{BlockRegistry, BlockState};

/// Smallest id width a section ever uses.
pub const MIN_BITS: u8 = 4;
/// Widest id width that still uses a local palette.
pub const MAX_HASHED_BITS: u8 = 8;

/// Which palette flavour backs a given id width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteKind {
    Linear,
    Hashed,
    Identity,
}

impl PaletteKind {
    pub fn for_bits(bits: u8, registry: &BlockRegistry) -> PaletteKind {
        if bits >= identity_bits(registry) || bits > MAX_HASHED_BITS {
            PaletteKind::Identity
        } else if bits <= MIN_BITS {
            PaletteKind::Linear
        } else {
            PaletteKind::Hashed
        }
    }
}

/// Width used once a section falls back to global ids.
pub fn identity_bits(registry: &BlockRegistry) -> u8 {
    registry.bits().max(MIN_BITS)
}

/// Bijection between local ids and block states.
#[derive(Debug, Clone)]
pub enum Palette {
    /// At most 16 entries, looked up by scanning.
    Linear { entries: Vec<BlockState> },
    /// At most 256 entries with a reverse index.
    Hashed {
        entries: Vec<BlockState>,
        index: HashMap<BlockState, u32>,
    },
    /// Local ids are global registry ids.
    Identity,
}

impl Palette {
    /// Empty palette of the given kind. Local palettes start with air at id 0
    /// so zeroed storage decodes as air.
    pub fn new(kind: PaletteKind) -> Self {
        match kind {
            PaletteKind::Linear => Palette::Linear {
                entries: vec![BlockState::AIR],
            },
            PaletteKind::Hashed => Palette::Hashed {
                entries: vec![BlockState::AIR],
                index: HashMap::from([(BlockState::AIR, 0)]),
            },
            PaletteKind::Identity => Palette::Identity,
        }
    }

    /// Rebuilds a local palette from raw entries as read from storage.
    pub fn from_entries(kind: PaletteKind, entries: Vec<BlockState>) -> Self {
        match kind {
            PaletteKind::Linear => Palette::Linear { entries },
            PaletteKind::Hashed => {
                let index = entries
                    .iter()
                    .enumerate()
                    .map(|(id, state)| (*state, id as u32))
                    .collect();
                Palette::Hashed { entries, index }
            }
            PaletteKind::Identity => Palette::Identity,
        }
    }

    pub fn kind(&self) -> PaletteKind {
        match self {
            Palette::Linear { .. } => PaletteKind::Linear,
            Palette::Hashed { .. } => PaletteKind::Hashed,
            Palette::Identity => PaletteKind::Identity,
        }
    }

    /// Number of local entries; zero for the identity palette.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn entries(&self) -> &[BlockState] {
        match self {
            Palette::Linear { entries } | Palette::Hashed { entries, .. } => entries,
            Palette::Identity => &[],
        }
    }

    pub fn id_of(&self, state: BlockState) -> Option<u32> {
        match self {
            Palette::Linear { entries } => entries
                .iter()
                .position(|entry| *entry == state)
                .map(|id| id as u32),
            Palette::Hashed { index, .. } => index.get(&state).copied(),
            Palette::Identity => Some(state.0),
        }
    }

    /// Whether another entry still fits into `bits` wide ids.
    pub fn has_room(&self, bits: u8) -> bool {
        match self {
            Palette::Identity => true,
            _ => self.len() < (1usize << bits),
        }
    }

    /// Appends a state and returns its id. Callers check [`Palette::has_room`]
    /// first.
    pub fn insert(&mut self, state: BlockState) -> u32 {
        match self {
            Palette::Linear { entries } => {
                entries.push(state);
                (entries.len() - 1) as u32
            }
            Palette::Hashed { entries, index } => {
                let id = entries.len() as u32;
                entries.push(state);
                index.insert(state, id);
                id
            }
            Palette::Identity => state.0,
        }
    }

    pub fn state_of(&self, id: u32, registry: &BlockRegistry) -> Option<BlockState> {
        match self {
            Palette::Linear { entries } | Palette::Hashed { entries, .. } => {
                entries.get(id as usize).copied()
            }
            Palette::Identity => {
                let state = BlockState(id);
                registry.contains(state).then_some(state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(states: u32) -> BlockRegistry {
        BlockRegistry::builder()
            .air("air")
            .block("filler", states - 1, true, false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_kind_for_bits() {
        let reg = registry(20_000);
        assert_eq!(PaletteKind::for_bits(4, &reg), PaletteKind::Linear);
        assert_eq!(PaletteKind::for_bits(5, &reg), PaletteKind::Hashed);
        assert_eq!(PaletteKind::for_bits(8, &reg), PaletteKind::Hashed);
        assert_eq!(PaletteKind::for_bits(9, &reg), PaletteKind::Identity);

        let small = registry(20);
        assert_eq!(identity_bits(&small), 5);
        assert_eq!(PaletteKind::for_bits(4, &small), PaletteKind::Linear);
        assert_eq!(PaletteKind::for_bits(5, &small), PaletteKind::Identity);

        let tiny = registry(3);
        assert_eq!(PaletteKind::for_bits(4, &tiny), PaletteKind::Identity);
    }

    #[test]
    fn test_air_is_entry_zero() {
        for kind in [PaletteKind::Linear, PaletteKind::Hashed] {
            let palette = Palette::new(kind);
            assert_eq!(palette.id_of(BlockState::AIR), Some(0));
            assert_eq!(palette.len(), 1);
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let reg = registry(300);
        let mut palette = Palette::new(PaletteKind::Hashed);
        for id in 1..32 {
            assert!(palette.has_room(5));
            assert_eq!(palette.insert(BlockState(id * 3)), id);
        }
        assert!(!palette.has_room(5));
        assert_eq!(palette.id_of(BlockState(30)), Some(10));
        assert_eq!(palette.state_of(10, &reg), Some(BlockState(30)));
        assert_eq!(palette.state_of(40, &reg), None);
    }

    #[test]
    fn test_identity_lookup() {
        let reg = registry(10);
        let palette = Palette::new(PaletteKind::Identity);
        assert_eq!(palette.id_of(BlockState(7)), Some(7));
        assert_eq!(palette.state_of(7, &reg), Some(BlockState(7)));
        assert_eq!(palette.state_of(12, &reg), None);
        assert!(palette.has_room(4));
    }
}
