pub mod block;
pub mod error;
pub mod signature;
pub mod types;

pub use block::{BlockRegistry, BlockState};
pub use error::UmbraError;
pub use signature::{Signature, SignatureBuilder};
pub use types::{BlockPos, ChunkPos, Position, Result, WorldProperties};
