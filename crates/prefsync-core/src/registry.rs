//! Weakly held map from store identity to its one live handle.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use prefsync_store::{Scope, StoreId};
use tracing::debug;

use crate::handle::StoreHandle;

/// Resolves a [`StoreId`] to the single live [`StoreHandle`] for it.
///
/// Entries are weak: the registry never keeps a handle alive. Entries whose
/// handle has been dropped are purged on every resolve, so dead entries are
/// bounded by how often the registry is used.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: HashMap<StoreId, Weak<StoreHandle>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live handle for `id`, or register the one built by `make`.
    pub fn resolve_with(
        &mut self,
        id: &StoreId,
        make: impl FnOnce() -> StoreHandle,
    ) -> Arc<StoreHandle> {
        self.purge();
        if let Some(live) = self.entries.get(id).and_then(Weak::upgrade) {
            return live;
        }
        let handle = Arc::new(make());
        self.entries.insert(id.clone(), Arc::downgrade(&handle));
        debug!(store = %id, "handle created");
        handle
    }

    /// Drop entries whose handle is gone. Returns how many were removed.
    pub fn purge(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        before - self.entries.len()
    }

    /// Every live handle.
    pub fn live(&self) -> Vec<Arc<StoreHandle>> {
        self.entries.values().filter_map(Weak::upgrade).collect()
    }

    /// Live handles of one scope.
    pub fn live_in(&self, scope: Scope) -> Vec<Arc<StoreHandle>> {
        self.entries
            .values()
            .filter_map(Weak::upgrade)
            .filter(|h| h.scope() == scope)
            .collect()
    }

    /// Number of entries, including any not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
