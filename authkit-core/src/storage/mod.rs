//! Two-tier durable key-value storage.
//!
//! The core composes two tiers explicitly (see [`crate::identity`]): a fast
//! plaintext cache and a hardware-backed secure vault. Both are expressed as
//! the same [`KeyValueStore`] capability so call sites never reach for
//! ambient helpers.

mod error;
pub mod keys;
mod memory;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use std::sync::Arc;

/// Shared handle to one storage tier.
pub type StoreHandle = Arc<dyn KeyValueStore>;

/// Removes every key in `keys` from `store`, stopping at the first backend
/// failure.
///
/// # Errors
///
/// Returns the first delete error encountered.
pub fn delete_all(store: &dyn KeyValueStore, keys: &[&str]) -> StorageResult<()> {
    for key in keys {
        store.delete(key)?;
    }
    Ok(())
}
