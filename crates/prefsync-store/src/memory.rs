//! In-memory engine for tests and embedding.
//!
//! [`MemoryDisk`] plays the part of durable storage. It is cheaply cloneable
//! and clones share state, so two [`InMemoryNativeStore`]s opened on the same
//! disk behave like two processes using the same preference files: each sees
//! the other's writes only after the writer commits and the reader re-fetches.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::domain::{Domain, PendingOp};
use crate::engine::{CachedStore, DurableBackend};
use crate::error::{StoreError, StoreResult};
use crate::scope::StoreId;

#[derive(Debug, Default)]
struct DiskState {
    documents: HashMap<StoreId, Domain>,
    commits: HashMap<StoreId, usize>,
    failing: HashSet<String>,
}

/// Shared in-memory durable storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryDisk {
    state: Arc<Mutex<DiskState>>,
}

impl MemoryDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every commit to a store named `name` fail (or succeed again).
    pub fn fail_commits(&self, name: &str, fail: bool) {
        let mut state = self.state.lock().expect("disk lock poisoned");
        if fail {
            state.failing.insert(name.to_string());
        } else {
            state.failing.remove(name);
        }
    }

    /// Number of successful commits of `id` so far.
    pub fn commit_count(&self, id: &StoreId) -> usize {
        self.state
            .lock()
            .expect("disk lock poisoned")
            .commits
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Total successful commits across all stores.
    pub fn total_commits(&self) -> usize {
        self.state
            .lock()
            .expect("disk lock poisoned")
            .commits
            .values()
            .sum()
    }

    /// Read a key straight from durable storage, bypassing any engine cache.
    pub fn durable_value(&self, id: &StoreId, path: &str, key: &str) -> Option<String> {
        let state = self.state.lock().expect("disk lock poisoned");
        state
            .documents
            .get(id)?
            .get_key(path, key)
            .map(String::from)
    }

    /// Whether durable storage holds a node at `path` in `id`.
    pub fn durable_node_exists(&self, id: &StoreId, path: &str) -> bool {
        let state = self.state.lock().expect("disk lock poisoned");
        state
            .documents
            .get(id)
            .map(|d| d.contains_node(path))
            .unwrap_or(false)
    }
}

impl DurableBackend for MemoryDisk {
    fn load(&self, id: &StoreId) -> StoreResult<Domain> {
        let state = self.state.lock().expect("disk lock poisoned");
        Ok(state.documents.get(id).cloned().unwrap_or_default())
    }

    fn persist(&self, id: &StoreId, ops: &[PendingOp]) -> StoreResult<()> {
        let mut state = self.state.lock().expect("disk lock poisoned");
        if state.failing.contains(&id.name) {
            return Err(StoreError::CommitFailed {
                id: id.clone(),
                reason: "injected commit failure".into(),
            });
        }
        state.documents.entry(id.clone()).or_default().apply_all(ops);
        *state.commits.entry(id.clone()).or_insert(0) += 1;
        Ok(())
    }
}

/// Engine whose durable storage is a [`MemoryDisk`].
pub type InMemoryNativeStore = CachedStore<MemoryDisk>;

impl CachedStore<MemoryDisk> {
    /// A new engine on a fresh, private disk.
    pub fn new() -> Self {
        Self::with_backend(MemoryDisk::new())
    }

    /// A new engine sharing durable storage with `disk`.
    pub fn on_disk(disk: &MemoryDisk) -> Self {
        Self::with_backend(disk.clone())
    }

    pub fn disk(&self) -> &MemoryDisk {
        self.backend()
    }
}

impl Default for CachedStore<MemoryDisk> {
    fn default() -> Self {
        Self::new()
    }
}
