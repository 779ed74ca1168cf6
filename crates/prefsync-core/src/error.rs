use std::path::PathBuf;

use prefsync_store::StoreError;

/// Errors from synchronizer operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The native store rejected a mutation or query.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error, e.g. reading a configuration file or starting the timer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The synchronizer that owned a handle has been dropped.
    #[error("synchronizer has shut down")]
    Shutdown,
}

/// Result alias for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;
