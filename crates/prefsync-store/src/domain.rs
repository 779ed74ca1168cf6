//! In-memory shape of one store document and the operations that mutate it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// One node of a store document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Names of the node's direct children.
    #[serde(default)]
    pub children: BTreeSet<String>,
    /// Key/value pairs stored at the node.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

/// A whole store document: node path to node record.
///
/// Paths start and end with `/`; the store root is `/`. A node's
/// descendants are exactly the paths that extend its own.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain {
    nodes: BTreeMap<String, NodeRecord>,
}

/// A queued mutation, replayed onto the durable document at commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingOp {
    AddNode { path: String },
    RemoveNode { path: String },
    AddChild { path: String, child: String },
    RemoveChild { path: String, child: String },
    PutKey { path: String, key: String, value: String },
    RemoveKey { path: String, key: String },
}

impl PendingOp {
    pub fn path(&self) -> &str {
        match self {
            Self::AddNode { path }
            | Self::RemoveNode { path }
            | Self::AddChild { path, .. }
            | Self::RemoveChild { path, .. }
            | Self::PutKey { path, .. }
            | Self::RemoveKey { path, .. } => path,
        }
    }
}

/// Reject paths that are not of the form `/` or `/a/b/`.
pub fn validate_path(path: &str) -> StoreResult<()> {
    let invalid = |reason: &str| {
        Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    };
    if !path.starts_with('/') {
        return invalid("must start with '/'");
    }
    if !path.ends_with('/') {
        return invalid("must end with '/'");
    }
    if path.contains("//") {
        return invalid("empty path component");
    }
    Ok(())
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, path: &str) -> Option<&NodeRecord> {
        self.nodes.get(path)
    }

    pub fn contains_node(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_key(&self, path: &str, key: &str) -> Option<&str> {
        self.nodes.get(path)?.keys.get(key).map(String::as_str)
    }

    pub fn children(&self, path: &str) -> Vec<String> {
        self.nodes
            .get(path)
            .map(|n| n.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keys(&self, path: &str) -> Vec<String> {
        self.nodes
            .get(path)
            .map(|n| n.keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply one operation. Returns `true` if the document changed.
    pub fn apply(&mut self, op: &PendingOp) -> bool {
        match op {
            PendingOp::AddNode { path } => {
                if self.nodes.contains_key(path) {
                    false
                } else {
                    self.nodes.insert(path.clone(), NodeRecord::default());
                    true
                }
            }
            PendingOp::RemoveNode { path } => {
                let before = self.nodes.len();
                self.nodes.retain(|p, _| !p.starts_with(path.as_str()));
                self.nodes.len() != before
            }
            PendingOp::AddChild { path, child } => self
                .nodes
                .entry(path.clone())
                .or_default()
                .children
                .insert(child.clone()),
            PendingOp::RemoveChild { path, child } => self
                .nodes
                .get_mut(path)
                .map(|n| n.children.remove(child))
                .unwrap_or(false),
            PendingOp::PutKey { path, key, value } => {
                let node = self.nodes.entry(path.clone()).or_default();
                node.keys.insert(key.clone(), value.clone()).as_ref() != Some(value)
            }
            PendingOp::RemoveKey { path, key } => self
                .nodes
                .get_mut(path)
                .map(|n| n.keys.remove(key).is_some())
                .unwrap_or(false),
        }
    }

    /// Replay a queue of operations in order.
    pub fn apply_all(&mut self, ops: &[PendingOp]) {
        for op in ops {
            self.apply(op);
        }
    }
}
