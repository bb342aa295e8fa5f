//! Structural diff between two configuration trees.

use indexmap::IndexMap;
use serde::Serialize;

use crate::path;
use crate::tree::{NodeId, Tree};

/// A leaf whose value differs between the two trees.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChangedLeaf {
    pub path: String,
    pub from: serde_json::Value,
    pub to: serde_json::Value,
}

/// Added/removed node paths and changed leaf values, in discovery
/// order.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ConfigDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<ChangedLeaf>,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compare two trees by canonical node path.
pub fn diff(old: &Tree, new: &Tree) -> ConfigDiff {
    let old_paths = index_paths(old);
    let new_paths = index_paths(new);

    let mut result = ConfigDiff::default();
    for (path, old_id) in &old_paths {
        match new_paths.get(path) {
            None => result.removed.push(path.clone()),
            Some(new_id) => {
                if let (Some(old_value), Some(new_value)) =
                    (old.leaf_value(*old_id), new.leaf_value(*new_id))
                {
                    if old_value != new_value {
                        result.changed.push(ChangedLeaf {
                            path: path.clone(),
                            from: old_value.to_json(old),
                            to: new_value.to_json(new),
                        });
                    }
                }
            }
        }
    }
    for path in new_paths.keys() {
        if !old_paths.contains_key(path) {
            result.added.push(path.clone());
        }
    }
    result
}

/// All non-root node paths in pre-order.
pub fn index_paths(tree: &Tree) -> IndexMap<String, NodeId> {
    let mut paths = IndexMap::new();
    let root = tree.root();
    let _ = tree.visit(root, &mut |id| {
        if id != root {
            paths.insert(path::node_path(tree, id), id);
        }
        std::ops::ControlFlow::Continue(())
    });
    paths
}
