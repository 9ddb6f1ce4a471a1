use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use umbra_common::ChunkPos;

/// Backing storage for cache records. Calls are blocking and are only made
/// from the cache worker or a blocking task.
pub trait CacheStore: Send + Sync + 'static {
    fn load(&self, pos: ChunkPos) -> io::Result<Option<Vec<u8>>>;

    fn store(&self, pos: ChunkPos, record: &[u8]) -> io::Result<()>;
}

/// Keeps records in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<ChunkPos, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "memory store lock poisoned")
}

impl CacheStore for MemoryStore {
    fn load(&self, pos: ChunkPos) -> io::Result<Option<Vec<u8>>> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        Ok(records.get(&pos).cloned())
    }

    fn store(&self, pos: ChunkPos, record: &[u8]) -> io::Result<()> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        records.insert(pos, record.to_vec());
        Ok(())
    }
}
