//! Behavior every engine must share, exercised through `dyn NativeStore`.

use prefsync_store::{FileNativeStore, InMemoryNativeStore, NativeStore, Scope, StoreId};

fn app() -> StoreId {
    StoreId::new("com.acme.engines", Scope::System)
}

fn exercise(store: &dyn NativeStore) {
    let id = app();

    assert!(store.add_node(&id, "/").unwrap());
    assert!(!store.add_node(&id, "/").unwrap());
    assert!(store.add_node(&id, "/net/").unwrap());
    assert!(store.add_child_to_node(&id, "/", "net").unwrap());
    assert!(store.add_key_to_node(&id, "/net/", "proxy", "none").unwrap());
    assert!(store.add_key_to_node(&id, "/net/", "port", "8080").unwrap());

    assert_eq!(store.children_for_node(&id, "/").unwrap(), vec!["net"]);
    assert_eq!(store.keys_for_node(&id, "/net/").unwrap(), vec!["port", "proxy"]);

    store.commit(&id).unwrap();

    // Re-fetched after commit.
    assert_eq!(
        store.get_key_from_node(&id, "/net/", "proxy").unwrap().as_deref(),
        Some("none")
    );

    assert!(store.remove_key_from_node(&id, "/net/", "proxy").unwrap());
    assert!(!store.remove_key_from_node(&id, "/net/", "proxy").unwrap());
    assert!(store.remove_child_from_node(&id, "/", "net").unwrap());
    assert!(store.remove_node(&id, "/net/").unwrap());
    store.commit(&id).unwrap();

    assert!(store.children_for_node(&id, "/").unwrap().is_empty());
    assert!(store.keys_for_node(&id, "/net/").unwrap().is_empty());
    assert_eq!(store.get_key_from_node(&id, "/net/", "port").unwrap(), None);
}

#[test]
fn in_memory_engine() {
    exercise(&InMemoryNativeStore::new());
}

#[test]
fn file_engine() {
    let dir = tempfile::tempdir().unwrap();
    exercise(&FileNativeStore::open(dir.path()));
}

#[test]
fn engines_are_object_safe_and_shareable() {
    use std::sync::Arc;
    use std::thread;

    let store: Arc<dyn NativeStore> = Arc::new(InMemoryNativeStore::new());
    let mut workers = Vec::new();
    for t in 0..4 {
        let store = Arc::clone(&store);
        workers.push(thread::spawn(move || {
            for i in 0..25 {
                store
                    .add_key_to_node(&app(), "/", &format!("k{t}-{i}"), "v")
                    .unwrap();
            }
            store.commit(&app()).unwrap();
        }));
    }
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(store.keys_for_node(&app(), "/").unwrap().len(), 100);
}
