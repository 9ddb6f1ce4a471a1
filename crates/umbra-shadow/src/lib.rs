pub mod changes;
pub mod chunk;
pub mod exposure;
pub mod modifier;
pub mod real;
pub mod section;
pub mod view;
pub mod visibility;
pub mod world;

pub use changes::{BlockChange, ChunkChanges, DynamismChange};
pub use chunk::{chunk_seed, ObfuscationState, ShadowChunk};
pub use modifier::{Modifier, ModifierConfig, ModifierPipeline};
pub use real::{column_checksum, RealColumn, RealView, RealWorld};
pub use section::ShadowSection;
pub use view::{ChunkContext, ObfuscationView};
pub use visibility::{DynamicVisibilityTracker, VisibilityChanges};
pub use world::ShadowWorld;
