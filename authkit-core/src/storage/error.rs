use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by a key-value tier.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store rejected or failed the operation.
    #[error("storage_backend: {0}")]
    Backend(String),
    /// The backing store is not reachable at all (e.g. the platform vault
    /// refused to open). Callers treat this as fatal for identity material.
    #[error("storage_unavailable: {0}")]
    Unavailable(String),
}
