//! Errors from the persistence layer.

/// Errors surfaced by a [`crate::PolicyBackend`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend failed to read.
    #[error("storage read failed: {0}")]
    Read(String),

    /// The backend failed to write.
    #[error("storage write failed: {0}")]
    Write(String),

    /// The backend failed to open or migrate its schema.
    #[error("storage initialization failed: {0}")]
    Init(String),
}
