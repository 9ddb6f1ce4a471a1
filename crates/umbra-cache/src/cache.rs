use crate::store::CacheStore;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use umbra_common::signature::SIGNATURE_LEN;
use umbra_common::{ChunkPos, Signature};
use umbra_logger::{log, LogSeverity};

struct PendingSave {
    sequence: u64,
    record: Bytes,
}

#[derive(Default)]
struct PendingSaves {
    next_sequence: u64,
    saves: HashMap<ChunkPos, PendingSave>,
}

enum Request {
    Save(ChunkPos),
    Flush(oneshot::Sender<()>),
}

fn lock(pending: &Mutex<PendingSaves>) -> MutexGuard<'_, PendingSaves> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persistent cache of computed fake views. Records are the signature of
/// the producing pipeline followed by the serialized chunk; a record whose
/// signature differs is treated as missing.
///
/// Saves go through an in-memory pending map and are written by a background
/// task, so a pending save always wins over what the store holds.
pub struct ObfuscationCache {
    signature: Signature,
    store: Arc<dyn CacheStore>,
    pending: Arc<Mutex<PendingSaves>>,
    sender: mpsc::UnboundedSender<Request>,
    worker: JoinHandle<()>,
}

impl ObfuscationCache {
    /// Spawns the save worker, so this must be called from within a tokio
    /// runtime.
    pub fn new(signature: Signature, store: Arc<dyn CacheStore>) -> Self {
        let pending = Arc::new(Mutex::new(PendingSaves::default()));
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(store.clone(), pending.clone(), receiver));
        Self {
            signature,
            store,
            pending,
            sender,
            worker,
        }
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn pending_saves(&self) -> usize {
        lock(&self.pending).saves.len()
    }

    /// Cached payload for `pos`, or `None` on a miss. Stale signatures and
    /// store failures are misses too.
    pub async fn read(&self, pos: ChunkPos) -> Option<Vec<u8>> {
        loop {
            let (sequence, pending) = {
                let pending = lock(&self.pending);
                let record = pending.saves.get(&pos).map(|save| save.record.clone());
                (pending.next_sequence, record)
            };
            if let Some(record) = pending {
                return self.payload(pos, &record);
            }

            let store = self.store.clone();
            let loaded = task::spawn_blocking(move || store.load(pos)).await;

            // A write that arrived during the load is newer than anything the
            // store returned. If the worker already wrote it, load again.
            let (current, pending) = {
                let pending = lock(&self.pending);
                let record = pending.saves.get(&pos).map(|save| save.record.clone());
                (pending.next_sequence, record)
            };
            if let Some(record) = pending {
                return self.payload(pos, &record);
            }
            if current != sequence {
                continue;
            }

            return match loaded {
                Ok(Ok(Some(record))) => self.payload(pos, &record),
                Ok(Ok(None)) => None,
                Ok(Err(e)) => {
                    log(
                        format!("Failed to read cached chunk {}: {}", pos, e),
                        LogSeverity::Warning,
                    );
                    None
                }
                Err(e) => {
                    log(
                        format!("Cache read task for chunk {} failed: {}", pos, e),
                        LogSeverity::Error,
                    );
                    None
                }
            };
        }
    }

    fn payload(&self, pos: ChunkPos, record: &[u8]) -> Option<Vec<u8>> {
        if Signature::from_slice(record) != Some(self.signature) {
            log(
                format!("Cached chunk {} has a stale signature", pos),
                LogSeverity::Debug,
            );
            return None;
        }
        Some(record[SIGNATURE_LEN..].to_vec())
    }

    /// Queues `payload` for saving. A later write for the same chunk
    /// supersedes this one if the worker has not reached it yet.
    pub fn write(&self, pos: ChunkPos, payload: &[u8]) {
        let mut record = BytesMut::with_capacity(SIGNATURE_LEN + payload.len());
        record.put_slice(self.signature.as_bytes());
        record.put_slice(payload);
        {
            let mut pending = lock(&self.pending);
            pending.next_sequence += 1;
            let sequence = pending.next_sequence;
            pending.saves.insert(
                pos,
                PendingSave {
                    sequence,
                    record: record.freeze(),
                },
            );
        }
        if self.sender.send(Request::Save(pos)).is_err() {
            log(
                format!("Cache worker is gone, chunk {} stays unsaved", pos),
                LogSeverity::Warning,
            );
        }
    }

    /// Waits until every save queued so far has reached the store.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Request::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Flushes, then stops the worker.
    pub async fn shutdown(self) {
        self.flush().await;
        let ObfuscationCache { sender, worker, .. } = self;
        drop(sender);
        if let Err(e) = worker.await {
            log(format!("Cache worker failed: {}", e), LogSeverity::Error);
        }
    }
}

async fn run_worker(
    store: Arc<dyn CacheStore>,
    pending: Arc<Mutex<PendingSaves>>,
    mut receiver: mpsc::UnboundedReceiver<Request>,
) {
    while let Some(request) = receiver.recv().await {
        let pos = match request {
            Request::Save(pos) => pos,
            Request::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };
        // Superseded saves were already written by an earlier request.
        let Some((sequence, record)) = lock(&pending)
            .saves
            .get(&pos)
            .map(|save| (save.sequence, save.record.clone()))
        else {
            continue;
        };

        let target = store.clone();
        match task::spawn_blocking(move || target.store(pos, &record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log(
                format!("Failed to save cached chunk {}: {}", pos, e),
                LogSeverity::Warning,
            ),
            Err(e) => log(
                format!("Cache save task for chunk {} failed: {}", pos, e),
                LogSeverity::Error,
            ),
        }

        let mut guard = lock(&pending);
        if guard
            .saves
            .get(&pos)
            .map_or(false, |save| save.sequence == sequence)
        {
            guard.saves.remove(&pos);
        }
    }
}
