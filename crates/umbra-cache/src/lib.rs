pub mod cache;
pub mod region;
pub mod store;

pub use cache::ObfuscationCache;
pub use region::RegionStore;
pub use store::{CacheStore, MemoryStore};
