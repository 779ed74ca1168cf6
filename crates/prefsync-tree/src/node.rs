//! Preference nodes and their mapping onto native stores.
//!
//! The two roots live in the [`DEFAULT_STORE`] at path `/`. Every direct
//! child of a root gets a native store of its own, named after the child,
//! with its record at `/`. Deeper descendants share their top-level
//! ancestor's store: the child `name` of a node at store path `p` lives at
//! `p + name + "/"`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use prefsync_core::{Scope, StoreHandle, Synchronizer};
use tracing::debug;

use crate::error::{PrefsError, PrefsResult};

/// Maximum key length, in characters.
pub const MAX_KEY_LENGTH: usize = 80;
/// Maximum value length, in characters.
pub const MAX_VALUE_LENGTH: usize = 8 * 1024;
/// Maximum node name length, in characters.
pub const MAX_NAME_LENGTH: usize = 80;
/// Native store holding the root nodes.
pub const DEFAULT_STORE: &str = "prefsync.default";

/// One node in a preference tree.
///
/// Cheap to clone. While any clone of a node is alive, navigating to the same
/// path returns that same node (see [`PartialEq`]).
#[derive(Clone)]
pub struct PrefsNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    sync: Synchronizer,
    name: String,
    absolute_path: String,
    scope: Scope,
    handle: Arc<StoreHandle>,
    /// Where this node's record lives inside `handle`'s store.
    store_path: String,
    parent: Option<PrefsNode>,
    children: Mutex<HashMap<String, Weak<NodeInner>>>,
    removed: AtomicBool,
}

impl PrefsNode {
    pub(crate) fn root(sync: &Synchronizer, scope: Scope) -> Self {
        let handle = sync.resolve_handle(DEFAULT_STORE, scope.is_user());
        Self {
            inner: Arc::new(NodeInner {
                sync: sync.clone(),
                name: String::new(),
                absolute_path: "/".into(),
                scope,
                handle,
                store_path: "/".into(),
                parent: None,
                children: Mutex::new(HashMap::new()),
                removed: AtomicBool::new(false),
            }),
        }
    }

    /// The node's name relative to its parent; empty for a root.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Slash-separated path from the root, `/` for a root.
    pub fn absolute_path(&self) -> &str {
        &self.inner.absolute_path
    }

    pub fn is_user_node(&self) -> bool {
        self.inner.scope.is_user()
    }

    pub fn scope(&self) -> Scope {
        self.inner.scope
    }

    pub fn parent(&self) -> Option<&PrefsNode> {
        self.inner.parent.as_ref()
    }

    /// Whether this node or any of its ancestors has been removed.
    pub fn is_removed(&self) -> bool {
        let mut node = self;
        loop {
            if node.inner.removed.load(Ordering::Acquire) {
                return true;
            }
            match node.parent() {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Name of the native store backing this node.
    pub fn store_name(&self) -> &str {
        self.inner.handle.name()
    }

    /// Value stored under `key`, if any.
    pub fn get(&self, key: &str) -> PrefsResult<Option<String>> {
        validate_key(key)?;
        self.check_live()?;
        Ok(self.inner.handle.get_key_from_node(&self.inner.store_path, key)?)
    }

    /// Value stored under `key`, or `default` when it is absent.
    pub fn get_or(&self, key: &str, default: &str) -> PrefsResult<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_owned()))
    }

    /// Associate `value` with `key`. Written back on the next flush.
    pub fn put(&self, key: &str, value: &str) -> PrefsResult<()> {
        validate_key(key)?;
        validate_value(key, value)?;
        self.with_live_structure(|| {
            self.inner
                .handle
                .add_key_to_node(&self.inner.store_path, key, value)?;
            Ok(())
        })
    }

    /// Remove `key`. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> PrefsResult<()> {
        validate_key(key)?;
        self.with_live_structure(|| {
            self.inner
                .handle
                .remove_key_from_node(&self.inner.store_path, key)?;
            Ok(())
        })
    }

    /// Keys with a value on this node, sorted.
    pub fn keys(&self) -> PrefsResult<Vec<String>> {
        self.check_live()?;
        Ok(self.inner.handle.keys_for_node(&self.inner.store_path)?)
    }

    /// Names of this node's children, sorted.
    pub fn children_names(&self) -> PrefsResult<Vec<String>> {
        self.check_live()?;
        Ok(self.inner.handle.children_for_node(&self.inner.store_path)?)
    }

    /// The node at `path`, creating it and any missing ancestors.
    ///
    /// A path starting with `/` is resolved from this node's root, anything
    /// else relative to this node. The empty path names this node.
    pub fn node(&self, path: &str) -> PrefsResult<PrefsNode> {
        self.check_live()?;
        let (mut current, names) = self.walk_start(path)?;
        for name in names {
            current = current.child(name)?;
        }
        Ok(current)
    }

    /// Whether the node at `path` exists. Never creates anything.
    ///
    /// On a removed node only the empty path may be asked about, and the
    /// answer is `false`.
    pub fn node_exists(&self, path: &str) -> PrefsResult<bool> {
        if path.is_empty() {
            return Ok(!self.is_removed());
        }
        self.check_live()?;
        let (mut current, names) = self.walk_start(path)?;
        for name in names {
            if !current.children_names()?.iter().any(|c| c == name) {
                return Ok(false);
            }
            current = current.child(name)?;
        }
        Ok(true)
    }

    /// Remove this node and its whole subtree.
    ///
    /// Detaching from the parent, removing the record and marking this node
    /// removed all happen under the synchronizer's structure lock. A
    /// concurrent flush writes both records or neither, and a write or child
    /// creation queued behind the removal fails with
    /// [`PrefsError::NodeRemoved`] instead of reviving the record.
    pub fn remove_node(&self) -> PrefsResult<()> {
        let Some(parent) = self.parent() else {
            return Err(PrefsError::RootRemoval);
        };

        self.with_live_structure(|| {
            parent
                .inner
                .handle
                .remove_child_from_node(&parent.inner.store_path, &self.inner.name)?;
            self.inner.handle.remove_node(&self.inner.store_path)?;
            self.inner.removed.store(true, Ordering::Release);
            Ok(())
        })?;

        let mut siblings = parent.lock_children();
        if siblings
            .get(&self.inner.name)
            .is_some_and(|w| w.ptr_eq(&Arc::downgrade(&self.inner)))
        {
            siblings.remove(&self.inner.name);
        }
        drop(siblings);
        self.lock_children().clear();
        debug!(path = %self.absolute_path(), scope = %self.scope(), "node removed");
        Ok(())
    }

    /// Write back every pending change in this node's scope.
    ///
    /// Works on removed nodes too, so their removal can be forced out.
    pub fn flush(&self) -> PrefsResult<()> {
        if self.inner.sync.flush_scope(self.scope()) {
            Ok(())
        } else {
            Err(PrefsError::BackingStore {
                op: "flush",
                scope: self.scope(),
            })
        }
    }

    /// Write back and refresh every store of this node's scope, picking up
    /// changes made by other processes.
    pub fn sync(&self) -> PrefsResult<()> {
        self.check_live()?;
        if self.inner.sync.sync_scope(self.scope()) {
            Ok(())
        } else {
            Err(PrefsError::BackingStore {
                op: "sync",
                scope: self.scope(),
            })
        }
    }

    fn check_live(&self) -> PrefsResult<()> {
        if self.is_removed() {
            return Err(PrefsError::NodeRemoved(self.inner.absolute_path.clone()));
        }
        Ok(())
    }

    /// Run `f` under the structure lock once this node is known to be live.
    fn with_live_structure<R>(&self, f: impl FnOnce() -> PrefsResult<R>) -> PrefsResult<R> {
        self.inner.sync.with_structure_lock(|| {
            self.check_live()?;
            f()
        })
    }

    fn lock_children(&self) -> MutexGuard<'_, HashMap<String, Weak<NodeInner>>> {
        self.inner
            .children
            .lock()
            .expect("child cache lock poisoned")
    }

    fn root_node(&self) -> PrefsNode {
        let mut node = self.clone();
        while let Some(parent) = node.parent().cloned() {
            node = parent;
        }
        node
    }

    /// Split `path` into a starting node and the validated names below it.
    fn walk_start<'a>(&self, path: &'a str) -> PrefsResult<(PrefsNode, Vec<&'a str>)> {
        let (start, rest) = match path.strip_prefix('/') {
            Some(rest) => (self.root_node(), rest),
            None => (self.clone(), path),
        };
        if rest.is_empty() {
            return Ok((start, Vec::new()));
        }
        let names: Vec<&str> = rest.split('/').collect();
        for name in &names {
            validate_name(name)?;
        }
        Ok((start, names))
    }

    /// The child `name`, from the cache or the store, created if missing.
    fn child(&self, name: &str) -> PrefsResult<PrefsNode> {
        // Held across creation so two threads cannot build the same child.
        let mut children = self.lock_children();
        if let Some(inner) = children.get(name).and_then(Weak::upgrade) {
            let cached = PrefsNode { inner };
            if !cached.is_removed() {
                return Ok(cached);
            }
        }
        children.retain(|_, w| w.strong_count() > 0);

        let child = self.new_child(name);
        if !self.children_names()?.iter().any(|c| c == name) {
            self.with_live_structure(|| {
                child.inner.handle.add_node(&child.inner.store_path)?;
                self.inner
                    .handle
                    .add_child_to_node(&self.inner.store_path, name)?;
                Ok(())
            })?;
            debug!(path = %child.absolute_path(), store = %child.store_name(), "node created");
        }
        children.insert(name.to_owned(), Arc::downgrade(&child.inner));
        Ok(child)
    }

    fn new_child(&self, name: &str) -> PrefsNode {
        let (handle, store_path, absolute_path) = match self.parent() {
            None => (
                self.inner.sync.resolve_handle(name, self.is_user_node()),
                "/".to_owned(),
                format!("/{name}"),
            ),
            Some(_) => (
                Arc::clone(&self.inner.handle),
                format!("{}{name}/", self.inner.store_path),
                format!("{}/{name}", self.inner.absolute_path),
            ),
        };
        PrefsNode {
            inner: Arc::new(NodeInner {
                sync: self.inner.sync.clone(),
                name: name.to_owned(),
                absolute_path,
                scope: self.inner.scope,
                handle,
                store_path,
                parent: Some(self.clone()),
                children: Mutex::new(HashMap::new()),
                removed: AtomicBool::new(false),
            }),
        }
    }
}

impl PartialEq for PrefsNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PrefsNode {}

impl fmt::Debug for PrefsNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefsNode")
            .field("path", &self.inner.absolute_path)
            .field("scope", &self.inner.scope)
            .field("store", &self.inner.handle.id())
            .field("removed", &self.is_removed())
            .finish()
    }
}

impl fmt::Display for PrefsNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} preference node {}", self.inner.scope, self.inner.absolute_path)
    }
}

fn validate_key(key: &str) -> PrefsResult<()> {
    let len = key.chars().count();
    if len > MAX_KEY_LENGTH {
        return Err(PrefsError::InvalidKey {
            key: key.to_owned(),
            reason: format!("{len} characters; limit is {MAX_KEY_LENGTH}"),
        });
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> PrefsResult<()> {
    let len = value.chars().count();
    if len > MAX_VALUE_LENGTH {
        return Err(PrefsError::ValueTooLong {
            key: key.to_owned(),
            len,
            max: MAX_VALUE_LENGTH,
        });
    }
    Ok(())
}

fn validate_name(name: &str) -> PrefsResult<()> {
    let reason = if name.is_empty() {
        "empty name (consecutive or trailing slash)".to_owned()
    } else if name.chars().count() > MAX_NAME_LENGTH {
        format!("longer than {MAX_NAME_LENGTH} characters")
    } else {
        return Ok(());
    };
    Err(PrefsError::InvalidName {
        name: name.to_owned(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_core::{StoreId, SyncConfig};
    use prefsync_store::{InMemoryNativeStore, NativeStore};
    use std::time::Duration;

    fn fixture() -> (PrefsNode, Synchronizer, Arc<InMemoryNativeStore>) {
        let native = Arc::new(InMemoryNativeStore::new());
        let store: Arc<dyn NativeStore> = native.clone();
        let config = SyncConfig::default()
            .with_unit(Duration::from_millis(10))
            .with_flush_delay(100_000);
        let sync = Synchronizer::new(store, config).unwrap();
        (PrefsNode::root(&sync, Scope::User), sync, native)
    }

    #[test]
    fn root_shape() {
        let (root, _sync, _native) = fixture();
        assert_eq!(root.name(), "");
        assert_eq!(root.absolute_path(), "/");
        assert!(root.parent().is_none());
        assert!(root.is_user_node());
        assert_eq!(root.store_name(), DEFAULT_STORE);
    }

    #[test]
    fn store_mapping_by_depth() {
        let (root, _sync, _native) = fixture();
        let top = root.node("com.acme").unwrap();
        let deep = root.node("com.acme/ui/colors").unwrap();

        assert_eq!(top.store_name(), "com.acme");
        assert_eq!(top.inner.store_path, "/");
        assert_eq!(deep.store_name(), "com.acme");
        assert_eq!(deep.inner.store_path, "/ui/colors/");
        assert_eq!(deep.absolute_path(), "/com.acme/ui/colors");
        assert_eq!(deep.name(), "colors");
    }

    #[test]
    fn creation_writes_child_links() {
        let (root, _sync, native) = fixture();
        root.node("app/section").unwrap();

        let default = StoreId::new(DEFAULT_STORE, Scope::User);
        let app = StoreId::new("app", Scope::User);
        assert_eq!(native.children_for_node(&default, "/").unwrap(), vec!["app"]);
        assert_eq!(native.children_for_node(&app, "/").unwrap(), vec!["section"]);
        assert_eq!(root.children_names().unwrap(), vec!["app"]);
    }

    #[test]
    fn navigation_returns_same_object() {
        let (root, _sync, _native) = fixture();
        let a = root.node("app/x").unwrap();
        let b = root.node("app").unwrap().node("x").unwrap();
        let c = a.node("/app/x").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.node("").unwrap(), a);
    }

    #[test]
    fn existing_node_is_not_rewritten() {
        let (root, sync, _native) = fixture();
        root.node("app").unwrap();
        assert!(root.flush().is_ok());

        root.node("app").unwrap();
        assert!(sync.dirty_ids().is_empty());
    }

    #[test]
    fn put_get_remove() {
        let (root, sync, _native) = fixture();
        let node = root.node("app").unwrap();
        assert_eq!(node.get("k").unwrap(), None);
        assert_eq!(node.get_or("k", "dflt").unwrap(), "dflt");

        node.put("k", "v").unwrap();
        assert_eq!(node.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(node.keys().unwrap(), vec!["k"]);
        assert!(sync.is_dirty(&StoreId::new("app", Scope::User)));

        node.remove("k").unwrap();
        node.remove("k").unwrap();
        assert_eq!(node.get("k").unwrap(), None);
    }

    #[test]
    fn limits_are_enforced() {
        let (root, _sync, _native) = fixture();
        let long_key = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            root.put(&long_key, "v"),
            Err(PrefsError::InvalidKey { .. })
        ));
        assert!(root.put(&"k".repeat(MAX_KEY_LENGTH), "v").is_ok());

        let long_value = "v".repeat(MAX_VALUE_LENGTH + 1);
        assert!(matches!(
            root.put("k", &long_value),
            Err(PrefsError::ValueTooLong { .. })
        ));
        assert!(root.put("k", &"v".repeat(MAX_VALUE_LENGTH)).is_ok());

        let long_name = "n".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            root.node(&long_name),
            Err(PrefsError::InvalidName { .. })
        ));
        assert!(matches!(root.node("a//b"), Err(PrefsError::InvalidName { .. })));
        assert!(matches!(root.node("a/"), Err(PrefsError::InvalidName { .. })));
    }

    #[test]
    fn node_exists_does_not_create() {
        let (root, sync, _native) = fixture();
        assert!(!root.node_exists("app/x").unwrap());
        assert!(sync.dirty_ids().is_empty());

        root.node("app/x").unwrap();
        assert!(root.node_exists("app").unwrap());
        assert!(root.node_exists("/app/x").unwrap());
        assert!(!root.node_exists("app/y").unwrap());
    }

    #[test]
    fn root_cannot_be_removed() {
        let (root, _sync, _native) = fixture();
        assert!(matches!(root.remove_node(), Err(PrefsError::RootRemoval)));
    }

    #[test]
    fn removal_invalidates_subtree() {
        let (root, _sync, _native) = fixture();
        let app = root.node("app").unwrap();
        let leaf = root.node("app/a/b").unwrap();
        leaf.put("k", "v").unwrap();

        app.remove_node().unwrap();
        assert!(app.is_removed());
        assert!(leaf.is_removed());
        assert!(matches!(leaf.get("k"), Err(PrefsError::NodeRemoved(_))));
        assert!(matches!(app.node("a"), Err(PrefsError::NodeRemoved(_))));
        assert!(!app.node_exists("").unwrap());
        assert!(!root.node_exists("app").unwrap());
        assert!(root.children_names().unwrap().is_empty());

        // Recreating yields a fresh, empty node.
        let again = root.node("app/a/b").unwrap();
        assert_ne!(again, leaf);
        assert_eq!(again.get("k").unwrap(), None);
    }

    #[test]
    fn removing_nested_node_keeps_siblings() {
        let (root, _sync, _native) = fixture();
        let a = root.node("app/a").unwrap();
        let ab = root.node("app/ab").unwrap();
        ab.put("k", "v").unwrap();

        a.remove_node().unwrap();
        assert_eq!(root.node("app").unwrap().children_names().unwrap(), vec!["ab"]);
        assert_eq!(ab.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn flush_failure_maps_to_backing_store() {
        let (root, _sync, native) = fixture();
        let node = root.node("broken").unwrap();
        native.disk().fail_commits("broken", true);
        node.put("k", "v").unwrap();

        assert!(matches!(
            node.flush(),
            Err(PrefsError::BackingStore { op: "flush", .. })
        ));
        assert!(matches!(
            node.sync(),
            Err(PrefsError::BackingStore { op: "sync", .. })
        ));
        native.disk().fail_commits("broken", false);
        assert!(node.flush().is_ok());
    }

    #[test]
    fn display_names_scope_and_path() {
        let (root, _sync, _native) = fixture();
        let node = root.node("app/x").unwrap();
        assert_eq!(node.to_string(), "user preference node /app/x");
    }
}
