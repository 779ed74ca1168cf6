//! Hierarchical preference trees over synchronized native stores.
//!
//! [`Preferences`] owns a user root and a system root. Navigating with
//! [`PrefsNode::node`] creates nodes on demand; every mutation goes through
//! the shared [`Synchronizer`](prefsync_core::Synchronizer), which defers
//! write-back to its flush timer. Call [`PrefsNode::flush`] or
//! [`PrefsNode::sync`] to force it.

pub mod error;
pub mod node;
pub mod preferences;

pub use error::{PrefsError, PrefsResult};
pub use node::{PrefsNode, DEFAULT_STORE, MAX_KEY_LENGTH, MAX_NAME_LENGTH, MAX_VALUE_LENGTH};
pub use preferences::Preferences;
