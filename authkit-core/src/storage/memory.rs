//! In-memory [`KeyValueStore`] implementation.
//!
//! Backs the plaintext cache tier in tests and serves as the reference
//! implementation of the storage contract. It is also usable as an ephemeral
//! profile store by embedders; it is NOT a substitute for the hardware vault
//! tier in production.

use std::collections::HashMap;
use std::sync::Mutex;

use super::error::{StorageError, StorageResult};
use super::traits::KeyValueStore;

/// A `Mutex<HashMap>`-backed storage tier.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries. Mostly useful in tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner lock is poisoned.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.lock()?.len())
    }

    /// Whether the store holds no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner lock is poisoned.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|err| StorageError::Backend(format!("mutex poisoned: {err}")))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
