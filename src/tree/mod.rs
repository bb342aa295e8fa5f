//! In-memory configuration and schema trees.
//!
//! # Responsibilities
//! - Arena-owned node storage (`Tree`, `NodeId`)
//! - Tagged node variants for config and schema nodes
//! - Child add/remove/deep-copy with parent back-links as indices
//! - Pre-order traversal with early exit
//!
//! # Design Decisions
//! - One tagged `NodeKind` instead of an inheritance diamond; all
//!   dispatch is exhaustive matching
//! - Parent links are arena indices, never owning references
//! - `add` replaces a same-named sibling in place (keyed upsert)
//! - Whole-tree deep copy is `Clone` of the arena: ids stay valid and
//!   schema links (ids into a separate schema tree) carry over untouched

pub mod value;

pub use value::Value;

use indexmap::IndexMap;
use std::ops::ControlFlow;
use thiserror::Error;

/// Schema attribute names recognized by the daemon.
pub mod attr {
    pub const DEFAULT: &str = "default";
    pub const DESCRIPTION: &str = "description";
    pub const UPDATE_CONSTRAINTS: &str = "update-constraints";
    pub const DELETE_CONSTRAINTS: &str = "delete-constraints";
    pub const UPDATE_DEPENDS: &str = "update-depends";
    pub const UPDATE_DEPENDENCIES: &str = "update-dependencies";
    pub const REFERENCE: &str = "reference";
    pub const PATTERN_NAME: &str = "pattern-name";
    pub const PATTERN_VALUE: &str = "pattern-value";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const TYPE: &str = "type";
    pub const KEY: &str = "@key";

    pub const ALL: &[&str] = &[
        DEFAULT,
        DESCRIPTION,
        UPDATE_CONSTRAINTS,
        DELETE_CONSTRAINTS,
        UPDATE_DEPENDS,
        UPDATE_DEPENDENCIES,
        REFERENCE,
        PATTERN_NAME,
        PATTERN_VALUE,
        MIN,
        MAX,
        TYPE,
        KEY,
    ];
}

/// Name of the schema child standing for "any member" of a
/// pattern-keyed container.
pub const ITEM_NODE: &str = "@item";

/// Ordered attribute map; duplicate values per key are preserved in
/// insertion order (multiple `update-depends`/`reference` entries).
pub type AttrMap = IndexMap<String, Vec<String>>;

/// Index of a node in its owning tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Capability set of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Leaf(Value),
    Composite(IndexMap<String, NodeId>),
    SchemaLeaf(AttrMap),
    SchemaComposite(AttrMap, IndexMap<String, NodeId>),
}

/// A named element of a configuration or schema tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    /// Non-owning link into the governing schema tree.
    pub schema: Option<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("no child named `{0}`")]
    ChildNotFound(String),
    #[error("node `{0}` has no child collection")]
    NotComposite(String),
}

/// Arena-owned tree. Detached nodes stay allocated until the tree is
/// dropped; they are unreachable from the root and ignored by traversal.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Create a tree whose root is an empty composite.
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = Node {
            name: root_name.into(),
            parent: None,
            schema: None,
            kind: NodeKind::Composite(IndexMap::new()),
        };
        Tree {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// Create a schema tree whose root is an empty schema composite.
    pub fn new_schema(root_name: impl Into<String>) -> Self {
        let root = Node {
            name: root_name.into(),
            parent: None,
            schema: None,
            kind: NodeKind::SchemaComposite(AttrMap::new(), IndexMap::new()),
        };
        Tree {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].name
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn schema_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].schema
    }

    /// Child collection, if this node has one.
    pub fn children(&self, id: NodeId) -> Option<&IndexMap<String, NodeId>> {
        match &self.nodes[id.index()].kind {
            NodeKind::Composite(children) | NodeKind::SchemaComposite(_, children) => {
                Some(children)
            }
            NodeKind::Leaf(_) | NodeKind::SchemaLeaf(_) => None,
        }
    }

    fn children_mut(&mut self, id: NodeId) -> Option<&mut IndexMap<String, NodeId>> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Composite(children) | NodeKind::SchemaComposite(_, children) => {
                Some(children)
            }
            NodeKind::Leaf(_) | NodeKind::SchemaLeaf(_) => None,
        }
    }

    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id).and_then(|c| c.get(name)).copied()
    }

    /// Materialized child count; used for schema `min`/`max` bounds.
    pub fn count(&self, id: NodeId) -> usize {
        self.children(id).map(|c| c.len()).unwrap_or(0)
    }

    /// Attribute map, if this is a schema node.
    pub fn attrs(&self, id: NodeId) -> Option<&AttrMap> {
        match &self.nodes[id.index()].kind {
            NodeKind::SchemaLeaf(attrs) | NodeKind::SchemaComposite(attrs, _) => Some(attrs),
            NodeKind::Leaf(_) | NodeKind::Composite(_) => None,
        }
    }

    /// All values recorded for one attribute, in insertion order.
    pub fn attr_values(&self, id: NodeId, name: &str) -> &[String] {
        self.attrs(id)
            .and_then(|a| a.get(name))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// First value recorded for one attribute.
    pub fn attr_first(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attr_values(id, name).first().map(String::as_str)
    }

    pub fn leaf_value(&self, id: NodeId) -> Option<&Value> {
        match &self.nodes[id.index()].kind {
            NodeKind::Leaf(value) => Some(value),
            _ => None,
        }
    }

    pub fn set_leaf_value(&mut self, id: NodeId, value: Value) {
        if let NodeKind::Leaf(slot) = &mut self.nodes[id.index()].kind {
            *slot = value;
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Attach a new child under `parent`. A same-named sibling is
    /// replaced in place and detached.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
        schema: Option<NodeId>,
    ) -> Result<NodeId, TreeError> {
        let name = name.into();
        if self.children(parent).is_none() {
            return Err(TreeError::NotComposite(self.name(parent).to_string()));
        }
        let id = self.alloc(Node {
            name: name.clone(),
            parent: Some(parent),
            schema,
            kind,
        });
        let replaced = self
            .children_mut(parent)
            .and_then(|children| children.insert(name, id));
        if let Some(old) = replaced {
            self.nodes[old.index()].parent = None;
        }
        Ok(id)
    }

    /// Detach the named child. The subtree stays allocated but becomes
    /// unreachable.
    pub fn remove_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, TreeError> {
        let removed = self
            .children_mut(parent)
            .and_then(|children| children.shift_remove(name));
        match removed {
            Some(id) => {
                self.nodes[id.index()].parent = None;
                Ok(id)
            }
            None => Err(TreeError::ChildNotFound(name.to_string())),
        }
    }

    /// Deep, independent duplicate of `node` attached under
    /// `new_parent`. Schema links are carried by reference, never
    /// duplicated.
    pub fn copy_subtree(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
    ) -> Result<NodeId, TreeError> {
        if self.children(new_parent).is_none() {
            return Err(TreeError::NotComposite(self.name(new_parent).to_string()));
        }
        let copy = self.duplicate(node);
        self.nodes[copy.index()].parent = Some(new_parent);
        let name = self.nodes[copy.index()].name.clone();
        let replaced = self
            .children_mut(new_parent)
            .and_then(|children| children.insert(name, copy));
        if let Some(old) = replaced {
            self.nodes[old.index()].parent = None;
        }
        Ok(copy)
    }

    fn duplicate(&mut self, node: NodeId) -> NodeId {
        let mut cloned = self.nodes[node.index()].clone();
        // Children are re-bound below; clear the map before allocating
        // so the copy never aliases the source's child ids.
        let child_ids: Vec<(String, NodeId)> = match &mut cloned.kind {
            NodeKind::Composite(children) | NodeKind::SchemaComposite(_, children) => {
                std::mem::take(children).into_iter().collect()
            }
            NodeKind::Leaf(_) | NodeKind::SchemaLeaf(_) => Vec::new(),
        };
        let copy = self.alloc(cloned);
        for (name, child) in child_ids {
            let child_copy = self.duplicate(child);
            self.nodes[child_copy.index()].parent = Some(copy);
            if let Some(children) = self.children_mut(copy) {
                children.insert(name, child_copy);
            }
        }
        copy
    }

    /// Pre-order visit starting at `from` (inclusive). The visitor may
    /// return `ControlFlow::Break(())` to abort the remaining traversal.
    pub fn visit<F>(&self, from: NodeId, visitor: &mut F) -> ControlFlow<()>
    where
        F: FnMut(NodeId) -> ControlFlow<()>,
    {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            visitor(id)?;
            if let Some(children) = self.children(id) {
                for child in children.values().rev() {
                    stack.push(*child);
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// First descendant of `from` (exclusive) with the given name, in
    /// pre-order. This is the whole-subtree search `select` builds on.
    pub fn find_by_name(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut found = None;
        let mut first = true;
        let _ = self.visit(from, &mut |id| {
            if first {
                first = false;
                return ControlFlow::Continue(());
            }
            if self.name(id) == name {
                found = Some(id);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        found
    }

    /// Render a config subtree back to JSON. Schema nodes render as
    /// their attribute map.
    pub fn to_json(&self, from: NodeId) -> serde_json::Value {
        match &self.nodes[from.index()].kind {
            NodeKind::Leaf(value) => value.to_json(self),
            NodeKind::Composite(children) => {
                let mut map = serde_json::Map::new();
                for (name, child) in children {
                    map.insert(name.clone(), self.to_json(*child));
                }
                serde_json::Value::Object(map)
            }
            NodeKind::SchemaLeaf(attrs) => attrs_to_json(attrs),
            NodeKind::SchemaComposite(attrs, children) => {
                let mut map = match attrs_to_json(attrs) {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                for (name, child) in children {
                    map.insert(name.clone(), self.to_json(*child));
                }
                serde_json::Value::Object(map)
            }
        }
    }

    /// Structural equality: same names, same parent/child shape, same
    /// leaf values. Arena ids and schema links are not compared.
    pub fn same_shape(&self, other: &Tree) -> bool {
        self.same_shape_at(self.root, other, other.root)
    }

    fn same_shape_at(&self, a: NodeId, other: &Tree, b: NodeId) -> bool {
        if self.name(a) != other.name(b) {
            return false;
        }
        match (&self.nodes[a.index()].kind, &other.nodes[b.index()].kind) {
            (NodeKind::Leaf(va), NodeKind::Leaf(vb)) => va == vb,
            (NodeKind::Composite(ca), NodeKind::Composite(cb))
            | (NodeKind::SchemaComposite(_, ca), NodeKind::SchemaComposite(_, cb)) => {
                ca.len() == cb.len()
                    && ca.iter().all(|(name, child_a)| {
                        cb.get(name)
                            .is_some_and(|child_b| self.same_shape_at(*child_a, other, *child_b))
                    })
            }
            (NodeKind::SchemaLeaf(aa), NodeKind::SchemaLeaf(ab)) => aa == ab,
            _ => false,
        }
    }
}

fn attrs_to_json(attrs: &AttrMap) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, values) in attrs {
        let rendered = if values.len() == 1 {
            serde_json::Value::String(values[0].clone())
        } else {
            serde_json::Value::Array(
                values
                    .iter()
                    .map(|v| serde_json::Value::String(v.clone()))
                    .collect(),
            )
        };
        map.insert(name.clone(), rendered);
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new("config");
        let platform = tree
            .add_child(tree.root(), "platform", NodeKind::Composite(IndexMap::new()), None)
            .unwrap();
        let port = tree
            .add_child(platform, "port", NodeKind::Composite(IndexMap::new()), None)
            .unwrap();
        tree.add_child(port, "speed", NodeKind::Leaf(Value::Str("100G".into())), None)
            .unwrap();
        (tree, platform, port)
    }

    #[test]
    fn add_replaces_same_name() {
        let (mut tree, platform, port) = sample();
        let replacement = tree
            .add_child(platform, "port", NodeKind::Leaf(Value::Int(1)), None)
            .unwrap();
        assert_eq!(tree.child(platform, "port"), Some(replacement));
        // The replaced subtree is detached, not re-parented.
        assert_eq!(tree.parent(port), None);
        assert_eq!(tree.count(platform), 1);
    }

    #[test]
    fn remove_detaches_parent_link() {
        let (mut tree, platform, port) = sample();
        let removed = tree.remove_child(platform, "port").unwrap();
        assert_eq!(removed, port);
        assert_eq!(tree.parent(port), None);
        assert_eq!(
            tree.remove_child(platform, "port"),
            Err(TreeError::ChildNotFound("port".into()))
        );
    }

    #[test]
    fn copy_subtree_is_deep_and_independent() {
        let (mut tree, _, port) = sample();
        let other = tree
            .add_child(tree.root(), "backup", NodeKind::Composite(IndexMap::new()), None)
            .unwrap();
        let copy = tree.copy_subtree(port, other).unwrap();
        assert_ne!(copy, port);
        assert_eq!(tree.parent(copy), Some(other));

        // Mutating the copy leaves the original untouched.
        let copied_speed = tree.child(copy, "speed").unwrap();
        tree.set_leaf_value(copied_speed, Value::Str("40G".into()));
        let original_speed = tree.child(port, "speed").unwrap();
        assert_eq!(
            tree.leaf_value(original_speed),
            Some(&Value::Str("100G".into()))
        );
    }

    #[test]
    fn visit_stops_on_break() {
        let (tree, _, _) = sample();
        let mut seen = Vec::new();
        let _ = tree.visit(tree.root(), &mut |id| {
            seen.push(tree.name(id).to_string());
            if tree.name(id) == "port" {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        assert_eq!(seen, vec!["config", "platform", "port"]);
    }

    #[test]
    fn whole_tree_clone_is_a_deep_copy() {
        let (tree, _, port) = sample();
        let mut copy = tree.clone();
        let speed = copy.child(port, "speed").unwrap();
        copy.set_leaf_value(speed, Value::Str("40G".into()));
        let original_speed = tree.child(port, "speed").unwrap();
        assert_eq!(
            tree.leaf_value(original_speed),
            Some(&Value::Str("100G".into()))
        );
        assert!(!tree.same_shape(&copy));
    }

    #[test]
    fn find_by_name_is_preorder_first_match() {
        let (tree, _, port) = sample();
        assert_eq!(tree.find_by_name(tree.root(), "port"), Some(port));
        assert_eq!(tree.find_by_name(tree.root(), "absent"), None);
    }
}
