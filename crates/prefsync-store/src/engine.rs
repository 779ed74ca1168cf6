//! The [`NativeStore`] implementation shared by every engine.

use tracing::warn;

use crate::cache::WriteBackCache;
use crate::domain::{validate_path, Domain, PendingOp};
use crate::error::StoreResult;
use crate::scope::StoreId;
use crate::traits::NativeStore;

/// Durable side of an engine: where store documents live between commits.
pub trait DurableBackend: Send + Sync {
    /// Read the durable document for `id`. A missing store is empty.
    fn load(&self, id: &StoreId) -> StoreResult<Domain>;

    /// Replay `ops` onto the current durable document for `id`.
    ///
    /// Must re-read the durable document rather than trust any earlier
    /// snapshot, so concurrent writers are merged rather than overwritten.
    fn persist(&self, id: &StoreId, ops: &[PendingOp]) -> StoreResult<()>;
}

/// A [`DurableBackend`] fronted by a [`WriteBackCache`].
#[derive(Debug)]
pub struct CachedStore<B> {
    backend: B,
    cache: WriteBackCache,
}

impl<B: DurableBackend> CachedStore<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            cache: WriteBackCache::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of writes to `id` not yet committed.
    pub fn pending_len(&self, id: &StoreId) -> usize {
        self.cache.pending_len(id)
    }

    /// Whether reads of `id` are currently served from cache.
    pub fn is_cached(&self, id: &StoreId) -> bool {
        self.cache.is_cached(id)
    }

    fn write(&self, id: &StoreId, op: PendingOp) -> StoreResult<bool> {
        validate_path(op.path())?;
        self.cache.write(id, || self.backend.load(id), op)
    }

    fn read<R>(&self, id: &StoreId, path: &str, f: impl FnOnce(&Domain) -> R) -> StoreResult<R> {
        validate_path(path)?;
        self.cache.read(id, || self.backend.load(id), f)
    }
}

impl<B: DurableBackend> NativeStore for CachedStore<B> {
    fn add_node(&self, id: &StoreId, path: &str) -> StoreResult<bool> {
        self.write(id, PendingOp::AddNode { path: path.into() })
    }

    fn remove_node(&self, id: &StoreId, path: &str) -> StoreResult<bool> {
        self.write(id, PendingOp::RemoveNode { path: path.into() })
    }

    fn add_child_to_node(&self, id: &StoreId, path: &str, child: &str) -> StoreResult<bool> {
        self.write(
            id,
            PendingOp::AddChild {
                path: path.into(),
                child: child.into(),
            },
        )
    }

    fn remove_child_from_node(
        &self,
        id: &StoreId,
        path: &str,
        child: &str,
    ) -> StoreResult<bool> {
        self.write(
            id,
            PendingOp::RemoveChild {
                path: path.into(),
                child: child.into(),
            },
        )
    }

    fn add_key_to_node(
        &self,
        id: &StoreId,
        path: &str,
        key: &str,
        value: &str,
    ) -> StoreResult<bool> {
        self.write(
            id,
            PendingOp::PutKey {
                path: path.into(),
                key: key.into(),
                value: value.into(),
            },
        )
    }

    fn remove_key_from_node(&self, id: &StoreId, path: &str, key: &str) -> StoreResult<bool> {
        self.write(
            id,
            PendingOp::RemoveKey {
                path: path.into(),
                key: key.into(),
            },
        )
    }

    fn get_key_from_node(
        &self,
        id: &StoreId,
        path: &str,
        key: &str,
    ) -> StoreResult<Option<String>> {
        self.read(id, path, |d| d.get_key(path, key).map(String::from))
    }

    fn children_for_node(&self, id: &StoreId, path: &str) -> StoreResult<Vec<String>> {
        self.read(id, path, |d| d.children(path))
    }

    fn keys_for_node(&self, id: &StoreId, path: &str) -> StoreResult<Vec<String>> {
        self.read(id, path, |d| d.keys(path))
    }

    fn commit(&self, id: &StoreId) -> StoreResult<()> {
        self.cache
            .commit(id, |ops| self.backend.persist(id, ops))
            .inspect_err(|e| warn!(store = %id, error = %e, "native commit failed"))
    }
}
