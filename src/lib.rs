pub use umbra_cache as cache;
pub use umbra_common as common;
pub use umbra_logger as logger;
pub use umbra_server as server;
pub use umbra_shadow as shadow;
pub use umbra_storage as storage;

// Re-export commonly used items
pub use umbra_logger::{log, LogSeverity};
pub use umbra_server::{EngineConfig, ShadowEngine, SyncBatch};
pub use umbra_shadow::{DynamicVisibilityTracker, ModifierConfig, ShadowWorld};
