//! Synchronizer between in-process preference nodes and native stores.
//!
//! Preference nodes never talk to a [`NativeStore`] directly. They resolve a
//! shared [`StoreHandle`] through the [`Synchronizer`] and mutate through it,
//! which records the handle as dirty and arms a deferred flush.
//!
//! # Components
//!
//! - [`HandleRegistry`] -- at most one live handle per store, held weakly so
//!   a handle disappears once no node references it.
//! - [`ChangeTracker`] -- strongly held set of handles with uncommitted writes.
//! - [`Scheduler`] -- one background timer thread running a coalescing
//!   one-shot flush job and an optional fixed-interval sync job.
//! - [`Synchronizer`] -- the façade tying them together behind one lock.
//!
//! # Flush versus sync
//!
//! A flush commits only the dirty handles. A sync commits every live handle,
//! dirty or not, because committing is also how a native store drops its
//! cached reads and picks up changes from other processes.
//!
//! [`NativeStore`]: prefsync_store::NativeStore

pub mod config;
pub mod error;
pub mod handle;
pub mod registry;
pub mod scheduler;
pub mod synchronizer;
pub mod tracker;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use handle::StoreHandle;
pub use registry::HandleRegistry;
pub use scheduler::{Job, JobRunner, Scheduler};
pub use synchronizer::{SyncStats, Synchronizer};
pub use tracker::ChangeTracker;

pub use prefsync_store::{Scope, StoreId};
