//! Native storage engines for scoped preference stores.
//!
//! A native store holds one document per [`StoreId`]: a flat map from node
//! path to [`NodeRecord`] (the node's child names and key/value pairs). Every
//! engine implements the [`NativeStore`] trait.
//!
//! # Write-back model
//!
//! Mutations never touch durable storage directly. They are applied to a
//! per-engine cached view of the document and queued as pending operations.
//! [`NativeStore::commit`] replays the queue onto the durable document and
//! then drops the cached view, so the next read re-fetches and observes
//! changes made by other writers in the meantime.
//!
//! # Engines
//!
//! - [`InMemoryNativeStore`] -- durable documents live in a shared in-memory
//!   disk; several engine instances can share one disk to model several
//!   processes. Supports commit fault injection for tests.
//! - [`FileNativeStore`] -- one JSON document per store under a root
//!   directory, replaced atomically on commit.

pub mod cache;
pub mod domain;
pub mod engine;
pub mod error;
pub mod file;
pub mod memory;
pub mod scope;
pub mod traits;

pub use cache::WriteBackCache;
pub use domain::{Domain, NodeRecord, PendingOp};
pub use engine::{CachedStore, DurableBackend};
pub use error::{StoreError, StoreResult};
pub use file::{FileBackend, FileNativeStore};
pub use memory::{InMemoryNativeStore, MemoryDisk};
pub use scope::{Scope, ScopeToken, StoreId};
pub use traits::NativeStore;
