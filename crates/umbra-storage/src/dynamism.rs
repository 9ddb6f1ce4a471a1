use umbra_common::types::{checked_section_index, SECTION_VOLUME};
use umbra_common::{Result, UmbraError};

/// Largest reveal distance a block can declare.
pub const MAX_REVEAL_DISTANCE: u8 = 10;
/// Bytes in the packed nibble array.
pub const DYNAMISM_BYTES: usize = SECTION_VOLUME / 2;

const BUCKETS: usize = MAX_REVEAL_DISTANCE as usize + 1;

/// Per block reveal distances of one section, four bits each, with a
/// histogram of how many blocks hold each distance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamismTrack {
    nibbles: Box<[u8; DYNAMISM_BYTES]>,
    counts: [u16; BUCKETS],
}

impl Default for DynamismTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamismTrack {
    pub fn new() -> Self {
        let mut counts = [0; BUCKETS];
        counts[0] = SECTION_VOLUME as u16;
        Self {
            nibbles: Box::new([0; DYNAMISM_BYTES]),
            counts,
        }
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> Result<u8> {
        Ok(self.get_at(checked_section_index(x, y, z)?))
    }

    pub fn get_at(&self, index: usize) -> u8 {
        let byte = self.nibbles[index >> 1];
        if index & 1 == 0 {
            byte & 0x0F
        } else {
            byte >> 4
        }
    }

    /// Returns whether the stored distance changed.
    pub fn set(&mut self, x: usize, y: usize, z: usize, distance: u8) -> Result<bool> {
        Ok(self.set_at(checked_section_index(x, y, z)?, distance))
    }

    /// Distances above [`MAX_REVEAL_DISTANCE`] saturate.
    pub fn set_at(&mut self, index: usize, distance: u8) -> bool {
        let distance = distance.min(MAX_REVEAL_DISTANCE);
        let previous = self.get_at(index);
        if previous == distance {
            return false;
        }

        let byte = &mut self.nibbles[index >> 1];
        if index & 1 == 0 {
            *byte = (*byte & 0xF0) | distance;
        } else {
            *byte = (*byte & 0x0F) | (distance << 4);
        }
        self.counts[previous as usize] -= 1;
        self.counts[distance as usize] += 1;
        true
    }

    pub fn count(&self, distance: u8) -> u16 {
        self.counts
            .get(distance as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn max_declared_distance(&self) -> u8 {
        (1..BUCKETS)
            .rev()
            .find(|distance| self.counts[*distance] > 0)
            .unwrap_or(0) as u8
    }

    pub fn is_clear(&self) -> bool {
        self.counts[0] as usize == SECTION_VOLUME
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Section indices with a nonzero distance, in index order.
    pub fn iter_declared(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        let empty = self.is_clear();
        (0..SECTION_VOLUME)
            .take_while(move |_| !empty)
            .filter_map(move |index| {
                let distance = self.get_at(index);
                (distance > 0).then_some((index as u16, distance))
            })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.nibbles[..]
    }

    /// Rebuilds a track from its nibble array. The histogram is recounted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let nibbles: [u8; DYNAMISM_BYTES] = bytes.try_into().map_err(|_| {
            UmbraError::corrupt(format!(
                "dynamism array of {} bytes, expected {}",
                bytes.len(),
                DYNAMISM_BYTES
            ))
        })?;
        let mut track = Self {
            nibbles: Box::new(nibbles),
            counts: [0; BUCKETS],
        };
        for index in 0..SECTION_VOLUME {
            let distance = track.get_at(index);
            if distance > MAX_REVEAL_DISTANCE {
                return Err(UmbraError::corrupt(format!(
                    "reveal distance {} at index {}",
                    distance, index
                )));
            }
            track.counts[distance as usize] += 1;
        }
        Ok(track)
    }
}
