use crate::types::ChunkPos;

/// Errors surfaced by the shadow engine.
#[derive(Debug, thiserror::Error)]
pub enum UmbraError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("position {x} {y} {z} is out of bounds")]
    PositionOutOfBounds { x: i32, y: i32, z: i32 },

    #[error("chunk {0} is not loaded")]
    ChunkNotLoaded(ChunkPos),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("unknown block state {0}")]
    UnknownBlockState(u32),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("modifier {name} failed: {reason}")]
    Modifier { name: String, reason: String },

    #[error("config error: {0}")]
    Config(String),
}

impl UmbraError {
    pub fn out_of_bounds(x: i32, y: i32, z: i32) -> Self {
        UmbraError::PositionOutOfBounds { x, y, z }
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        UmbraError::Corrupt(msg.into())
    }
}

impl From<serde_json::Error> for UmbraError {
    fn from(err: serde_json::Error) -> Self {
        UmbraError::Config(err.to_string())
    }
}
