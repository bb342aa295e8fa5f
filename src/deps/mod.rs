//! Update-dependency extraction and ordering.
//!
//! # Responsibilities
//! - Walk a tree and collect `update-depends` declarations keyed by
//!   schema path
//! - Resolve wildcard / placeholder / reference expressions against the
//!   concrete tree
//! - Topologically sort the dependency graph and map the order back to
//!   concrete instance paths
//!
//! # Design Decisions
//! - Every schema-linked node is registered, dependencies or not, so it
//!   participates in the final ordering
//! - An expression resolving to nothing is kept verbatim as a symbolic
//!   vertex; it orders nothing but never aborts the walk
//! - The sort uses an explicit work stack with the resolved/unresolved
//!   two-list scheme; a cycle aborts with no partial order

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::path::{self, render, tokenize, Segment};
use crate::tree::{attr, NodeId, Tree};

#[derive(Debug, Error, PartialEq)]
pub enum DependencyError {
    #[error("dependency cycle through `{0}`")]
    Cycle(String),
}

type Graph = IndexMap<String, IndexSet<String>>;

pub struct DependencyResolver<'a> {
    schema: &'a Tree,
    tree: &'a Tree,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(schema: &'a Tree, tree: &'a Tree) -> Self {
        DependencyResolver { schema, tree }
    }

    /// Compute a safe application order over the tree's concrete node
    /// paths: dependencies first, unordered nodes before all ordered
    /// ones.
    pub fn update_order(&self) -> Result<Vec<String>, DependencyError> {
        let (graph, buckets, unordered) = self.collect();
        let sorted = toposort(&graph)?;

        let mut order = unordered;
        let mut buckets = buckets;
        for schema_path in sorted {
            if let Some(bucket) = buckets.shift_remove(&schema_path) {
                order.extend(bucket);
            }
        }
        Ok(order)
    }

    /// One pre-order walk: adjacency keyed by schema path, instance
    /// buckets in discovery order, and the bucket of schema-less nodes.
    fn collect(&self) -> (Graph, IndexMap<String, Vec<String>>, Vec<String>) {
        let mut graph = Graph::new();
        let mut buckets: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut unordered = Vec::new();

        let root = self.tree.root();
        let _ = self.tree.visit(root, &mut |id| {
            if id != root {
                self.register(id, &mut graph, &mut buckets, &mut unordered);
            }
            std::ops::ControlFlow::Continue(())
        });
        (graph, buckets, unordered)
    }

    fn register(
        &self,
        id: NodeId,
        graph: &mut Graph,
        buckets: &mut IndexMap<String, Vec<String>>,
        unordered: &mut Vec<String>,
    ) {
        let concrete = path::node_path(self.tree, id);
        let Some(schema_node) = self.tree.schema_of(id) else {
            unordered.push(concrete);
            return;
        };
        let schema_path = path::node_path(self.schema, schema_node);
        buckets.entry(schema_path.clone()).or_default().push(concrete);

        let edges = graph.entry(schema_path).or_default();
        let mut raws: Vec<&String> = self
            .schema
            .attr_values(schema_node, attr::UPDATE_DEPENDS)
            .iter()
            .collect();
        raws.extend(
            self.schema
                .attr_values(schema_node, attr::UPDATE_DEPENDENCIES)
                .iter(),
        );
        for raw in raws {
            let resolved = self.resolve_dependency(id, raw);
            if resolved.is_empty() {
                // Best-effort symbolic dependency.
                edges.insert(render(&tokenize(raw)));
            } else {
                edges.extend(resolved);
            }
        }
    }

    /// Expand one raw dependency expression into the concrete paths it
    /// names in this tree instance.
    fn resolve_dependency(&self, node: NodeId, raw: &str) -> Vec<String> {
        let mut segments = tokenize(raw);

        // `@` markers stand for the declaring node's own name.
        for segment in segments.iter_mut() {
            if matches!(segment, Segment::Reference) {
                *segment = Segment::Name(self.tree.name(node).to_string());
            }
        }
        let rendered = render(&segments);

        let substituted = if segments.iter().any(placeholder) {
            match path::evaluate_xpath(self.tree, self.schema, node, &rendered) {
                Some(s) => s,
                None => return Vec::new(),
            }
        } else {
            rendered
        };

        if substituted.contains('*') {
            return path::expand_wildcard(self.tree, &substituted);
        }
        if path::select(self.tree, &substituted).is_some() {
            vec![substituted]
        } else if raw.contains('@') {
            // A reference marker that names a missing node falls back
            // to the caller's verbatim symbolic form.
            Vec::new()
        } else {
            // Plain schema-level path: kept as declared.
            vec![substituted]
        }
    }
}

fn placeholder(segment: &Segment) -> bool {
    matches!(segment, Segment::Item) || matches!(segment, Segment::Keyed { key, .. } if key == "@item")
}

/// Depth-first topological sort, resolved/unresolved two-list scheme,
/// explicit work stack. Dependencies come out before their dependents.
fn toposort(graph: &Graph) -> Result<Vec<String>, DependencyError> {
    enum Frame<'g> {
        Enter(&'g str),
        Exit(&'g str),
    }

    let mut resolved: IndexSet<String> = IndexSet::new();
    let mut unresolved: IndexSet<String> = IndexSet::new();

    for start in graph.keys() {
        if resolved.contains(start.as_str()) {
            continue;
        }
        let mut stack = vec![Frame::Enter(start)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(p) => {
                    if resolved.contains(p) {
                        continue;
                    }
                    if unresolved.contains(p) {
                        return Err(DependencyError::Cycle(p.to_string()));
                    }
                    unresolved.insert(p.to_string());
                    stack.push(Frame::Exit(p));
                    if let Some(deps) = graph.get(p) {
                        for dep in deps.iter().rev() {
                            stack.push(Frame::Enter(dep));
                        }
                    }
                }
                Frame::Exit(p) => {
                    unresolved.shift_remove(p);
                    resolved.insert(p.to_string());
                }
            }
        }
    }
    Ok(resolved.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{AttrMap, NodeKind, Value};
    use indexmap::IndexMap as Map;

    fn schema_leaf(attrs: &[(&str, &[&str])]) -> NodeKind {
        let mut map = AttrMap::new();
        for (name, values) in attrs {
            map.insert(
                name.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
        NodeKind::SchemaLeaf(map)
    }

    /// Schema leaves `a` (depends on /b) and `b`; config leaves linked
    /// accordingly plus an unlinked `c`.
    fn fixture() -> (Tree, Tree) {
        let mut schema = Tree::new_schema("schema");
        let s_a = schema
            .add_child(
                schema.root(),
                "a",
                schema_leaf(&[(attr::UPDATE_DEPENDS, &["/b"])]),
                None,
            )
            .unwrap();
        let s_b = schema
            .add_child(schema.root(), "b", schema_leaf(&[]), None)
            .unwrap();

        let mut tree = Tree::new("config");
        tree.add_child(tree.root(), "a", NodeKind::Leaf(Value::Int(1)), Some(s_a))
            .unwrap();
        tree.add_child(tree.root(), "b", NodeKind::Leaf(Value::Int(2)), Some(s_b))
            .unwrap();
        tree.add_child(tree.root(), "c", NodeKind::Leaf(Value::Int(3)), None)
            .unwrap();
        (schema, tree)
    }

    #[test]
    fn dependencies_precede_dependents() {
        let (schema, tree) = fixture();
        let order = DependencyResolver::new(&schema, &tree).update_order().unwrap();
        let pos_a = order.iter().position(|p| p == "/a").unwrap();
        let pos_b = order.iter().position(|p| p == "/b").unwrap();
        assert!(pos_b < pos_a, "expected /b before /a in {:?}", order);
    }

    #[test]
    fn unordered_nodes_come_first() {
        let (schema, tree) = fixture();
        let order = DependencyResolver::new(&schema, &tree).update_order().unwrap();
        assert_eq!(order[0], "/c");
    }

    #[test]
    fn cycle_aborts_with_no_order() {
        let mut schema = Tree::new_schema("schema");
        let s_a = schema
            .add_child(
                schema.root(),
                "a",
                schema_leaf(&[(attr::UPDATE_DEPENDS, &["/b"])]),
                None,
            )
            .unwrap();
        let s_b = schema
            .add_child(
                schema.root(),
                "b",
                schema_leaf(&[(attr::UPDATE_DEPENDS, &["/a"])]),
                None,
            )
            .unwrap();
        let mut tree = Tree::new("config");
        tree.add_child(tree.root(), "a", NodeKind::Leaf(Value::Int(1)), Some(s_a))
            .unwrap();
        tree.add_child(tree.root(), "b", NodeKind::Leaf(Value::Int(2)), Some(s_b))
            .unwrap();

        let result = DependencyResolver::new(&schema, &tree).update_order();
        assert!(matches!(result, Err(DependencyError::Cycle(_))));
    }

    #[test]
    fn wildcard_dependency_expands_against_instances() {
        let mut schema = Tree::new_schema("schema");
        let s_list = schema
            .add_child(
                schema.root(),
                "members",
                NodeKind::SchemaComposite(AttrMap::new(), Map::new()),
                None,
            )
            .unwrap();
        let s_gate = schema
            .add_child(
                schema.root(),
                "gate",
                schema_leaf(&[(attr::UPDATE_DEPENDS, &["members/*"])]),
                None,
            )
            .unwrap();

        let mut tree = Tree::new("config");
        let members = tree
            .add_child(
                tree.root(),
                "members",
                NodeKind::Composite(Map::new()),
                Some(s_list),
            )
            .unwrap();
        tree.add_child(members, "m1", NodeKind::Leaf(Value::Int(1)), None)
            .unwrap();
        tree.add_child(members, "m2", NodeKind::Leaf(Value::Int(2)), None)
            .unwrap();
        tree.add_child(tree.root(), "gate", NodeKind::Leaf(Value::Bool(true)), Some(s_gate))
            .unwrap();

        let order = DependencyResolver::new(&schema, &tree).update_order().unwrap();
        let gate = order.iter().position(|p| p == "/gate").unwrap();
        let m1 = order.iter().position(|p| p == "/members/m1").unwrap();
        let m2 = order.iter().position(|p| p == "/members/m2").unwrap();
        assert!(m1 < gate && m2 < gate, "unexpected order {:?}", order);
    }

    #[test]
    fn unresolvable_expression_is_kept_verbatim() {
        let mut schema = Tree::new_schema("schema");
        let s_a = schema
            .add_child(
                schema.root(),
                "a",
                schema_leaf(&[(attr::UPDATE_DEPENDS, &["ghost/[@item]/x"])]),
                None,
            )
            .unwrap();
        let mut tree = Tree::new("config");
        tree.add_child(tree.root(), "a", NodeKind::Leaf(Value::Int(1)), Some(s_a))
            .unwrap();

        // The symbolic vertex participates without aborting the sort.
        let order = DependencyResolver::new(&schema, &tree).update_order().unwrap();
        assert_eq!(order, vec!["/a".to_string()]);
    }
}
