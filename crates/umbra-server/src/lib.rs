pub mod config;
pub mod demo_world;
pub mod engine;
pub mod observer;
pub mod server;

pub use config::EngineConfig;
pub use engine::{ObserverSync, ShadowEngine, SyncBatch};
