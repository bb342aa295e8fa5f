//! Reverse-reference index.
//!
//! Maps each referenced node path to the set of source paths whose
//! schema `reference` attribute resolves to it. Rebuilt whenever a tree
//! instance is (re)installed; used to reject removal of a node that
//! something else still points at.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;

use crate::path;
use crate::tree::Tree;

#[derive(Debug, Default)]
pub struct ReverseRefIndex {
    by_target: IndexMap<String, IndexSet<String>>,
}

impl ReverseRefIndex {
    /// Walk the tree once and resolve every `reference` declaration.
    pub fn build(tree: &Tree, schema: &Tree) -> Self {
        let mut by_target: IndexMap<String, IndexSet<String>> = IndexMap::new();
        let root = tree.root();
        let _ = tree.visit(root, &mut |id| {
            if let Some(target) = path::resolve_reference(tree, schema, id) {
                by_target
                    .entry(path::node_path(tree, target))
                    .or_default()
                    .insert(path::node_path(tree, id));
            }
            std::ops::ControlFlow::Continue(())
        });
        ReverseRefIndex { by_target }
    }

    /// Source paths referencing `target`.
    pub fn sources_of(&self, target: &str) -> impl Iterator<Item = &str> {
        self.by_target
            .get(target)
            .into_iter()
            .flat_map(|sources| sources.iter().map(String::as_str))
    }

    /// Given the set of paths a transaction removes, find the first
    /// removed target still referenced from outside that set.
    pub fn held(&self, removed: &[String]) -> Option<(String, Vec<String>)> {
        let removed_set: HashSet<&str> = removed.iter().map(String::as_str).collect();
        for path in removed {
            if let Some(sources) = self.by_target.get(path) {
                let holders: Vec<String> = sources
                    .iter()
                    .filter(|s| !removed_set.contains(s.as_str()))
                    .cloned()
                    .collect();
                if !holders.is_empty() {
                    return Some((path.clone(), holders));
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{attr, AttrMap, NodeKind, ITEM_NODE};
    use indexmap::IndexMap as Map;

    /// Port members reference the matching interface member via
    /// `interface/ethernet/@`.
    fn fixture() -> (Tree, Tree) {
        let mut schema = Tree::new_schema("schema");
        let s_platform = schema
            .add_child(
                schema.root(),
                "platform",
                NodeKind::SchemaComposite(AttrMap::new(), Map::new()),
                None,
            )
            .unwrap();
        let s_port = schema
            .add_child(
                s_platform,
                "port",
                NodeKind::SchemaComposite(AttrMap::new(), Map::new()),
                None,
            )
            .unwrap();
        let mut item_attrs = AttrMap::new();
        item_attrs.insert(
            attr::REFERENCE.to_string(),
            vec!["interface/ethernet/@".to_string()],
        );
        let s_port_item = schema
            .add_child(
                s_port,
                ITEM_NODE,
                NodeKind::SchemaComposite(item_attrs, Map::new()),
                None,
            )
            .unwrap();
        let s_interface = schema
            .add_child(
                schema.root(),
                "interface",
                NodeKind::SchemaComposite(AttrMap::new(), Map::new()),
                None,
            )
            .unwrap();
        let s_ethernet = schema
            .add_child(
                s_interface,
                "ethernet",
                NodeKind::SchemaComposite(AttrMap::new(), Map::new()),
                None,
            )
            .unwrap();

        let mut tree = Tree::new("config");
        let platform = tree
            .add_child(tree.root(), "platform", NodeKind::Composite(Map::new()), Some(s_platform))
            .unwrap();
        let port = tree
            .add_child(platform, "port", NodeKind::Composite(Map::new()), Some(s_port))
            .unwrap();
        tree.add_child(port, "eth-1", NodeKind::Composite(Map::new()), Some(s_port_item))
            .unwrap();
        let interface = tree
            .add_child(tree.root(), "interface", NodeKind::Composite(Map::new()), Some(s_interface))
            .unwrap();
        let ethernet = tree
            .add_child(interface, "ethernet", NodeKind::Composite(Map::new()), Some(s_ethernet))
            .unwrap();
        tree.add_child(ethernet, "eth-1", NodeKind::Composite(Map::new()), None)
            .unwrap();
        (schema, tree)
    }

    #[test]
    fn indexes_resolved_references() {
        let (schema, tree) = fixture();
        let index = ReverseRefIndex::build(&tree, &schema);
        let sources: Vec<&str> = index.sources_of("/interface/ethernet/eth-1").collect();
        assert_eq!(sources, vec!["/platform/port/eth-1"]);
    }

    #[test]
    fn removal_of_a_referenced_target_is_held() {
        let (schema, tree) = fixture();
        let index = ReverseRefIndex::build(&tree, &schema);
        let removed = vec!["/interface/ethernet/eth-1".to_string()];
        let (target, holders) = index.held(&removed).unwrap();
        assert_eq!(target, "/interface/ethernet/eth-1");
        assert_eq!(holders, vec!["/platform/port/eth-1".to_string()]);
    }

    #[test]
    fn removing_source_and_target_together_is_allowed() {
        let (schema, tree) = fixture();
        let index = ReverseRefIndex::build(&tree, &schema);
        let removed = vec![
            "/interface/ethernet/eth-1".to_string(),
            "/platform/port/eth-1".to_string(),
        ];
        assert!(index.held(&removed).is_none());
    }
}
