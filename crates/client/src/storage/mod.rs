//! Durable key-value storage port
//!
//! The SDK persists the configuration fields and the retry-queue snapshot
//! through this port. Semantics are deliberately simple: synchronous
//! `get`/`set`/`remove` with last-write-wins, matching what mobile platforms
//! offer for small preference stores.

use scorelink_domain::ClientError;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for ClientError {
    fn from(err: StorageError) -> Self {
        ClientError::Storage(err.to_string())
    }
}

/// Synchronous, last-write-wins key-value storage.
///
/// Implementations must be safe to share across tasks; callers hold no lock
/// while invoking these methods.
pub trait KeyValueStorage: Send + Sync {
    /// Read a value, `None` if the key was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
