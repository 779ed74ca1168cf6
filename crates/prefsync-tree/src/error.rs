use prefsync_core::{Scope, SyncError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("invalid key `{key}`: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value for key `{key}` is {len} characters; limit is {max}")]
    ValueTooLong { key: String, len: usize, max: usize },

    #[error("invalid node name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("node has been removed: {0}")]
    NodeRemoved(String),

    #[error("the root node cannot be removed")]
    RootRemoval,

    #[error("{op} of {scope} preferences did not reach the backing store")]
    BackingStore { op: &'static str, scope: Scope },

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

pub type PrefsResult<T> = Result<T, PrefsError>;
