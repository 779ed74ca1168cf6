use crate::error::StoreResult;
use crate::scope::StoreId;

/// A native preference storage engine.
///
/// Every store is addressed by a [`StoreId`] and holds hierarchical node
/// records addressed by path (`/`, `/a/`, `/a/b/`). Implementations must be
/// thread-safe and make each primitive atomic on its own.
///
/// Mutations are buffered by the engine: they are visible to reads through
/// the same engine immediately but reach durable storage only on
/// [`commit`](NativeStore::commit). Mutation methods return `true` when the
/// engine's view of the store changed.
pub trait NativeStore: Send + Sync {
    /// Create an empty node at `path` if it does not exist.
    fn add_node(&self, id: &StoreId, path: &str) -> StoreResult<bool>;

    /// Remove the node at `path` together with all of its descendants.
    fn remove_node(&self, id: &StoreId, path: &str) -> StoreResult<bool>;

    /// Record `child` as a child of the node at `path`.
    fn add_child_to_node(&self, id: &StoreId, path: &str, child: &str) -> StoreResult<bool>;

    /// Remove `child` from the child list of the node at `path`.
    fn remove_child_from_node(&self, id: &StoreId, path: &str, child: &str)
        -> StoreResult<bool>;

    /// Set `key` to `value` on the node at `path`.
    fn add_key_to_node(&self, id: &StoreId, path: &str, key: &str, value: &str)
        -> StoreResult<bool>;

    /// Remove `key` from the node at `path`.
    fn remove_key_from_node(&self, id: &StoreId, path: &str, key: &str) -> StoreResult<bool>;

    /// Read `key` from the node at `path`.
    ///
    /// Returns `Ok(None)` if the node or the key does not exist.
    fn get_key_from_node(&self, id: &StoreId, path: &str, key: &str)
        -> StoreResult<Option<String>>;

    /// Child names of the node at `path`, sorted.
    fn children_for_node(&self, id: &StoreId, path: &str) -> StoreResult<Vec<String>>;

    /// Key names of the node at `path`, sorted.
    fn keys_for_node(&self, id: &StoreId, path: &str) -> StoreResult<Vec<String>>;

    /// Persist buffered writes for `id` and drop any cached reads, so the
    /// next access re-fetches the durable state.
    fn commit(&self, id: &StoreId) -> StoreResult<()>;
}
