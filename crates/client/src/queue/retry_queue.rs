//! Persisted FIFO queue of undelivered requests
//!
//! Entries are kept in enqueue order and the full snapshot is re-serialized
//! to the storage port on every mutation, inside the queue lock. That
//! favors crash-safety over write throughput, which is the right trade for
//! the low request volumes a mobile client produces.
//!
//! The snapshot is a versioned document so cross-restart and cross-version
//! compatibility stay well-defined: an unknown future version or a corrupt
//! payload is logged and dropped rather than crashing the client.

use std::sync::Arc;

use scorelink_domain::{ClientError, QueuedRequest, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::storage::KeyValueStorage;

/// Storage key holding the serialized queue snapshot.
pub const QUEUE_STORAGE_KEY: &str = "scorelink.request_queue";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct QueueSnapshot {
    version: u32,
    entries: Vec<QueuedRequest>,
}

/// Durable FIFO queue of requests awaiting delivery.
pub struct RetryQueue {
    entries: Mutex<Vec<QueuedRequest>>,
    storage: Arc<dyn KeyValueStorage>,
}

impl RetryQueue {
    /// Load the queue from its persisted snapshot.
    ///
    /// # Errors
    /// Returns [`ClientError::Storage`] when the backing store cannot be
    /// read at all. A readable but unusable snapshot starts the queue empty
    /// instead of failing.
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        let entries = match storage.get(QUEUE_STORAGE_KEY).map_err(ClientError::from)? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<QueueSnapshot>(&raw) {
                Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => snapshot.entries,
                Ok(snapshot) => {
                    warn!(version = snapshot.version,
                        "unsupported queue snapshot version; starting empty");
                    Vec::new()
                }
                Err(err) => {
                    warn!(error = %err, "corrupt queue snapshot; starting empty");
                    Vec::new()
                }
            },
        };

        if !entries.is_empty() {
            info!(count = entries.len(), "restored queued requests");
        }

        Ok(Self { entries: Mutex::new(entries), storage })
    }

    /// Append an entry and persist the snapshot.
    pub async fn enqueue(&self, entry: QueuedRequest) -> Result<()> {
        let mut entries = self.entries.lock().await;
        debug!(request_id = %entry.request.request_id, "enqueueing request");
        entries.push(entry);
        self.persist(&entries)
    }

    /// Remove the entry with the given request id, preserving the order of
    /// the others. Returns whether anything was removed.
    pub async fn dequeue(&self, request_id: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| entry.request.request_id != request_id);
        if entries.len() == before {
            return Ok(false);
        }
        debug!(request_id = %request_id, "dequeued request");
        self.persist(&entries)?;
        Ok(true)
    }

    /// Bump the attempt counter of an entry and persist.
    pub async fn record_attempt(&self, request_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut bumped = false;
        if let Some(entry) =
            entries.iter_mut().find(|entry| entry.request.request_id == request_id)
        {
            entry.attempts += 1;
            bumped = true;
        }
        if bumped {
            self.persist(&entries)?;
        }
        Ok(())
    }

    /// Snapshot of the entries in FIFO order.
    pub async fn oldest_first(&self) -> Vec<QueuedRequest> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn persist(&self, entries: &[QueuedRequest]) -> Result<()> {
        let snapshot = QueueSnapshot { version: SNAPSHOT_VERSION, entries: entries.to_vec() };
        let raw = serde_json::to_string(&snapshot)
            .map_err(|err| ClientError::Internal(format!("queue snapshot serialization: {err}")))?;
        self.storage.set(QUEUE_STORAGE_KEY, &raw).map_err(ClientError::from)
    }
}
