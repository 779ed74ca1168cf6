//! Per-engine cached views of store documents with queued writes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::domain::{Domain, PendingOp};
use crate::error::StoreResult;
use crate::scope::StoreId;

/// Cached document plus the operations not yet committed.
///
/// `snapshot` is the durable document as loaded, with `pending` already
/// applied to it, so reads see this engine's own uncommitted writes.
#[derive(Debug, Default)]
struct View {
    snapshot: Domain,
    pending: Vec<PendingOp>,
}

/// Write-back cache shared by the engines.
///
/// A view is loaded lazily on first access and lives until the next
/// successful commit of its store, after which the store is re-fetched.
#[derive(Debug, Default)]
pub struct WriteBackCache {
    views: Mutex<HashMap<StoreId, View>>,
}

impl WriteBackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the cached document, loading it first if needed.
    pub fn read<R>(
        &self,
        id: &StoreId,
        load: impl FnOnce() -> StoreResult<Domain>,
        f: impl FnOnce(&Domain) -> R,
    ) -> StoreResult<R> {
        let mut views = self.views.lock().expect("cache lock poisoned");
        let view = Self::view(&mut views, id, load)?;
        Ok(f(&view.snapshot))
    }

    /// Apply `op` to the cached document and queue it for commit.
    ///
    /// Returns `true` if the cached document changed.
    pub fn write(
        &self,
        id: &StoreId,
        load: impl FnOnce() -> StoreResult<Domain>,
        op: PendingOp,
    ) -> StoreResult<bool> {
        let mut views = self.views.lock().expect("cache lock poisoned");
        let view = Self::view(&mut views, id, load)?;
        let changed = view.snapshot.apply(&op);
        view.pending.push(op);
        Ok(changed)
    }

    /// Hand the queued operations of `id` to `persist` and, if it succeeds,
    /// drop the cached view so the next access re-fetches.
    ///
    /// On failure the view and its queue are kept intact. The cache lock is
    /// held throughout, so no write can slip in between persisting and
    /// invalidating.
    pub fn commit(
        &self,
        id: &StoreId,
        persist: impl FnOnce(&[PendingOp]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut views = self.views.lock().expect("cache lock poisoned");
        let pending = views.get(id).map(|v| v.pending.as_slice()).unwrap_or(&[]);
        let count = pending.len();
        persist(pending)?;
        views.remove(id);
        debug!(store = %id, ops = count, "committed and invalidated");
        Ok(())
    }

    /// Number of queued operations for `id`.
    pub fn pending_len(&self, id: &StoreId) -> usize {
        self.views
            .lock()
            .expect("cache lock poisoned")
            .get(id)
            .map(|v| v.pending.len())
            .unwrap_or(0)
    }

    /// Whether `id` currently has a cached view.
    pub fn is_cached(&self, id: &StoreId) -> bool {
        self.views
            .lock()
            .expect("cache lock poisoned")
            .contains_key(id)
    }

    fn view<'a>(
        views: &'a mut HashMap<StoreId, View>,
        id: &StoreId,
        load: impl FnOnce() -> StoreResult<Domain>,
    ) -> StoreResult<&'a mut View> {
        match views.entry(id.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let snapshot = load()?;
                Ok(entry.insert(View {
                    snapshot,
                    pending: Vec::new(),
                }))
            }
        }
    }
}
