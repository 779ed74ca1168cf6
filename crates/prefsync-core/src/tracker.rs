//! Set of handles with writes not yet committed.

use std::collections::HashMap;
use std::sync::Arc;

use prefsync_store::{Scope, StoreId};

use crate::handle::StoreHandle;

/// Strongly held set of dirty handles.
///
/// Holding the `Arc` keeps a dirty handle alive until it is flushed, even if
/// every preference node using it has been dropped. Because of that, at most
/// one handle object per store can ever be tracked, and membership is keyed
/// by [`StoreId`].
#[derive(Debug, Default)]
pub struct ChangeTracker {
    dirty: HashMap<StoreId, Arc<StoreHandle>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle`. Returns `true` if it was not already tracked.
    pub fn insert(&mut self, handle: &Arc<StoreHandle>) -> bool {
        self.dirty
            .insert(handle.id().clone(), Arc::clone(handle))
            .is_none()
    }

    pub fn contains(&self, id: &StoreId) -> bool {
        self.dirty.contains_key(id)
    }

    /// Remove and return every tracked handle.
    pub fn drain_all(&mut self) -> Vec<Arc<StoreHandle>> {
        self.dirty.drain().map(|(_, h)| h).collect()
    }

    /// Remove and return the tracked handles of one scope, leaving the rest.
    pub fn drain_scope(&mut self, scope: Scope) -> Vec<Arc<StoreHandle>> {
        let ids: Vec<StoreId> = self
            .dirty
            .iter()
            .filter(|(_, h)| h.scope() == scope)
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter_map(|id| self.dirty.remove(id)).collect()
    }

    pub fn clear(&mut self) {
        self.dirty.clear();
    }

    pub fn ids(&self) -> Vec<StoreId> {
        let mut ids: Vec<StoreId> = self.dirty.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.dirty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }
}
