// ── Settings store ──
//
// Durable key/value storage for the three pieces of state this layer
// persists: server settings, the selected agent, and the demo-mode flag.
// The trait is synchronous; implementations do small local I/O only.

mod repository;

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

pub use repository::{SettingsRepository, RECORD_VERSION};

/// Failure reading or writing the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings store is corrupt: {0}")]
    Corrupt(String),

    #[error("cannot encode {key}: {message}")]
    Encode { key: String, message: String },
}

/// Durable string key/value storage.
///
/// `set` must be atomic from the caller's point of view: a concurrent or
/// later `get` sees either the old value or the new one, never a mix.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store. State is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}
