use std::fmt;
use std::sync::{Arc, Weak};

use prefsync_store::{NativeStore, Scope, StoreId, StoreResult};

use crate::error::{SyncError, SyncResult};
use crate::synchronizer::Shared;

/// Shared reference to one native store.
///
/// Obtained from [`Synchronizer::resolve_handle`](crate::Synchronizer::resolve_handle).
/// While any `Arc<StoreHandle>` for a store is alive, resolving the same
/// `(name, scope)` returns that same object.
///
/// Mutating methods go through the owning synchronizer: the write is applied
/// to the native store and the handle is marked dirty under the
/// synchronizer's lock. Queries go straight to the native store.
pub struct StoreHandle {
    id: StoreId,
    scope: Scope,
    native: Arc<dyn NativeStore>,
    owner: Weak<Shared>,
}

impl StoreHandle {
    pub(crate) fn new(
        id: StoreId,
        scope: Scope,
        native: Arc<dyn NativeStore>,
        owner: Weak<Shared>,
    ) -> Self {
        Self {
            id,
            scope,
            native,
            owner,
        }
    }

    pub fn id(&self) -> &StoreId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_user(&self) -> bool {
        self.scope.is_user()
    }

    /// Persist this store's pending writes and drop its cached reads.
    pub fn commit(&self) -> StoreResult<()> {
        self.native.commit(&self.id)
    }

    pub fn add_node(self: &Arc<Self>, path: &str) -> SyncResult<bool> {
        self.mutate(|native, id| native.add_node(id, path))
    }

    pub fn remove_node(self: &Arc<Self>, path: &str) -> SyncResult<bool> {
        self.mutate(|native, id| native.remove_node(id, path))
    }

    pub fn add_child_to_node(self: &Arc<Self>, path: &str, child: &str) -> SyncResult<bool> {
        self.mutate(|native, id| native.add_child_to_node(id, path, child))
    }

    pub fn remove_child_from_node(self: &Arc<Self>, path: &str, child: &str) -> SyncResult<bool> {
        self.mutate(|native, id| native.remove_child_from_node(id, path, child))
    }

    pub fn add_key_to_node(self: &Arc<Self>, path: &str, key: &str, value: &str) -> SyncResult<bool> {
        self.mutate(|native, id| native.add_key_to_node(id, path, key, value))
    }

    pub fn remove_key_from_node(self: &Arc<Self>, path: &str, key: &str) -> SyncResult<bool> {
        self.mutate(|native, id| native.remove_key_from_node(id, path, key))
    }

    pub fn get_key_from_node(&self, path: &str, key: &str) -> SyncResult<Option<String>> {
        Ok(self.native.get_key_from_node(&self.id, path, key)?)
    }

    pub fn children_for_node(&self, path: &str) -> SyncResult<Vec<String>> {
        Ok(self.native.children_for_node(&self.id, path)?)
    }

    pub fn keys_for_node(&self, path: &str) -> SyncResult<Vec<String>> {
        Ok(self.native.keys_for_node(&self.id, path)?)
    }

    fn mutate<F>(self: &Arc<Self>, op: F) -> SyncResult<bool>
    where
        F: FnOnce(&dyn NativeStore, &StoreId) -> StoreResult<bool>,
    {
        let owner = self.owner.upgrade().ok_or(SyncError::Shutdown)?;
        owner.apply_mutation(self, |handle| op(handle.native.as_ref(), &handle.id))
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
