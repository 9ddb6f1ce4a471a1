pub mod buffer;
pub mod dynamism;
pub mod palette;
pub mod paletted;

pub use buffer::ByteBuffer;
pub use dynamism::{DynamismTrack, DYNAMISM_BYTES, MAX_REVEAL_DISTANCE};
pub use palette::{Palette, PaletteKind};
pub use paletted::{PackedArray, PalettedSection};
