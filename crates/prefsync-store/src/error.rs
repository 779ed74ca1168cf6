use std::path::PathBuf;

use crate::scope::StoreId;

/// Errors from native store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A store document could not be encoded or decoded.
    #[error("corrupt store document {path}: {reason}")]
    CorruptDocument { path: PathBuf, reason: String },

    /// Commit of pending writes failed.
    #[error("commit failed for {id}: {reason}")]
    CommitFailed { id: StoreId, reason: String },

    /// A store name cannot be mapped onto the backend's namespace.
    #[error("invalid store name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A node path does not have the `/.../` shape the engines expect.
    #[error("invalid node path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Result alias for native store operations.
pub type StoreResult<T> = Result<T, StoreError>;
