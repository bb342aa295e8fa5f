//! Path resolution against a tree.
//!
//! # Responsibilities
//! - `select`: resolve a path to a single node
//! - `node_path`: canonical path string for a node
//! - `evaluate_xpath`: contextual `[@item]` substitution
//! - `resolve_reference`: follow schema `reference` templates
//! - `expand_wildcard`: concrete expansion of a `*` segment
//!
//! # Design Decisions
//! - Each `select` segment searches the whole remaining subtree, not
//!   just immediate children; first pre-order match wins (current
//!   behavior preserved, pinned by tests)
//! - Lookup misses return `None`, never errors; callers decide whether
//!   a miss is significant

use super::segment::{render, tokenize, Segment};
use crate::tree::{attr, NodeId, Tree, ITEM_NODE};

/// Resolve a path against the whole tree.
pub fn select(tree: &Tree, path: &str) -> Option<NodeId> {
    select_from(tree, tree.root(), path)
}

/// Resolve a path starting from `start`. A trailing literal `value`
/// segment that matches no node designates the node resolved so far as
/// the leaf holder.
pub fn select_from(tree: &Tree, start: NodeId, path: &str) -> Option<NodeId> {
    let segments = tokenize(path);
    let mut current = start;
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Name(name) => {
                if let Some(found) = tree.find_by_name(current, name) {
                    current = found;
                } else if name == "value" && i == last {
                    return Some(current);
                } else {
                    return None;
                }
            }
            Segment::Keyed { name, key } => {
                let container = tree.find_by_name(current, name)?;
                current = tree.find_by_name(container, key)?;
            }
            // Placeholders must be substituted before selection.
            Segment::Item | Segment::Reference | Segment::Wildcard => return None,
        }
    }
    Some(current)
}

/// Canonical path of a node: parent names up to (and excluding) the
/// root, `/`-joined with a leading slash. The root itself renders as
/// the empty string.
pub fn node_path(tree: &Tree, node: NodeId) -> String {
    let mut names = Vec::new();
    let mut current = Some(node);
    while let Some(id) = current {
        if tree.parent(id).is_some() {
            names.push(tree.name(id).to_string());
        }
        current = tree.parent(id);
    }
    names.reverse();
    let mut out = String::new();
    for name in &names {
        out.push('/');
        out.push_str(name);
    }
    out
}

/// Substitute every `[@item]` placeholder in `path` relative to
/// `start`'s ancestry and return the substituted path string. Other
/// segments are left untouched. Returns `None` when a placeholder
/// cannot be resolved; callers must treat that as a plain miss.
pub fn evaluate_xpath(tree: &Tree, schema: &Tree, start: NodeId, path: &str) -> Option<String> {
    let mut segments = tokenize(path);
    for i in 0..segments.len() {
        let anchor = match &segments[i] {
            Segment::Item => match i.checked_sub(1).map(|p| &segments[p]) {
                Some(Segment::Name(name)) | Some(Segment::Keyed { name, .. }) => {
                    Some(name.clone())
                }
                _ => None,
            },
            Segment::Keyed { name, key } if key == ITEM_NODE => Some(name.clone()),
            _ => continue,
        };
        let member = item_member_name(tree, schema, start, anchor.as_deref())?;
        match &mut segments[i] {
            Segment::Keyed { key, .. } => *key = member,
            slot => *slot = Segment::Name(member),
        }
    }
    Some(render(&segments))
}

/// Name of the nearest ancestor of `start` (inclusive) that is a
/// keyed-list member. This is the contextual key `[@item]` and the
/// `xpath_key_regex_replace` family start from.
pub fn list_member_key(tree: &Tree, schema: &Tree, start: NodeId) -> Option<String> {
    let mut current = Some(start);
    while let Some(id) = current {
        if is_list_member(tree, schema, id) {
            return Some(tree.name(id).to_string());
        }
        current = tree.parent(id);
    }
    None
}

/// The name standing in for `[@item]`: the nearest keyed-list member in
/// the ancestry, or, failing that, the ancestry step directly below the
/// ancestor named `anchor`.
fn item_member_name(
    tree: &Tree,
    schema: &Tree,
    start: NodeId,
    anchor: Option<&str>,
) -> Option<String> {
    if let Some(key) = list_member_key(tree, schema, start) {
        return Some(key);
    }

    let anchor = anchor?;
    let mut chain = Vec::new();
    let mut current = Some(start);
    while let Some(id) = current {
        chain.push(id);
        current = tree.parent(id);
    }
    chain.reverse();
    let index = chain.iter().position(|id| tree.name(*id) == anchor)?;
    chain
        .get(index + 1)
        .map(|id| tree.name(*id).to_string())
}

/// A node is a keyed-list member when its parent is governed by a
/// pattern-keyed schema composite (one carrying an `@item` child).
fn is_list_member(tree: &Tree, schema: &Tree, id: NodeId) -> bool {
    let Some(parent) = tree.parent(id) else {
        return false;
    };
    let Some(parent_schema) = tree.schema_of(parent) else {
        return false;
    };
    schema.child(parent_schema, ITEM_NODE).is_some()
}

/// Follow the governing schema node's `reference` templates in order,
/// substituting this node's own name for `@` markers, and return the
/// first template that resolves to an existing node.
pub fn resolve_reference(tree: &Tree, schema: &Tree, node: NodeId) -> Option<NodeId> {
    let schema_node = tree.schema_of(node)?;
    for template in schema.attr_values(schema_node, attr::REFERENCE) {
        let mut segments = tokenize(template);
        for segment in segments.iter_mut() {
            if matches!(segment, Segment::Reference) {
                *segment = Segment::Name(tree.name(node).to_string());
            }
        }
        let Some(substituted) = evaluate_xpath(tree, schema, node, &render(&segments)) else {
            continue;
        };
        if let Some(target) = select(tree, &substituted) {
            return Some(target);
        }
    }
    None
}

/// Expand a single `*` segment against the members of the keyed list
/// addressed by the prefix, returning every concrete path that exists.
/// A path without a wildcard returns itself when it exists.
pub fn expand_wildcard(tree: &Tree, path: &str) -> Vec<String> {
    let segments = tokenize(path);
    let Some(star) = segments.iter().position(|s| matches!(s, Segment::Wildcard)) else {
        return match select(tree, path) {
            Some(_) => vec![render(&segments)],
            None => Vec::new(),
        };
    };
    let prefix = render(&segments[..star]);
    let Some(anchor) = select(tree, &prefix) else {
        return Vec::new();
    };
    let Some(children) = tree.children(anchor) else {
        return Vec::new();
    };
    let mut expanded = Vec::new();
    for name in children.keys() {
        let mut candidate = segments.clone();
        candidate[star] = Segment::Name(name.clone());
        let rendered = render(&candidate);
        if select(tree, &rendered).is_some() {
            expanded.push(rendered);
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{AttrMap, NodeKind, Value};
    use indexmap::IndexMap;

    fn composite() -> NodeKind {
        NodeKind::Composite(IndexMap::new())
    }

    fn schema_composite() -> NodeKind {
        NodeKind::SchemaComposite(AttrMap::new(), IndexMap::new())
    }

    /// Schema: platform/port (keyed, with @item/breakout-mode) and
    /// interface/ethernet (keyed, with @item/speed).
    /// Config: /platform/port/eth-1/breakout-mode = "none",
    ///         /interface/ethernet/eth-1/speed = "100G".
    fn fixture() -> (Tree, Tree, NodeId) {
        let mut schema = Tree::new_schema("schema");
        let s_platform = schema
            .add_child(schema.root(), "platform", schema_composite(), None)
            .unwrap();
        let s_port = schema
            .add_child(s_platform, "port", schema_composite(), None)
            .unwrap();
        let s_port_item = schema
            .add_child(s_port, ITEM_NODE, schema_composite(), None)
            .unwrap();
        schema
            .add_child(
                s_port_item,
                "breakout-mode",
                NodeKind::SchemaLeaf(AttrMap::new()),
                None,
            )
            .unwrap();
        let s_interface = schema
            .add_child(schema.root(), "interface", schema_composite(), None)
            .unwrap();
        let s_ethernet = schema
            .add_child(s_interface, "ethernet", schema_composite(), None)
            .unwrap();
        let s_eth_item = schema
            .add_child(s_ethernet, ITEM_NODE, schema_composite(), None)
            .unwrap();
        schema
            .add_child(s_eth_item, "speed", NodeKind::SchemaLeaf(AttrMap::new()), None)
            .unwrap();

        let mut tree = Tree::new("config");
        let platform = tree
            .add_child(tree.root(), "platform", composite(), Some(s_platform))
            .unwrap();
        let port = tree
            .add_child(platform, "port", composite(), Some(s_port))
            .unwrap();
        let eth1 = tree
            .add_child(port, "eth-1", composite(), Some(s_port_item))
            .unwrap();
        let breakout = tree
            .add_child(
                eth1,
                "breakout-mode",
                NodeKind::Leaf(Value::Str("none".into())),
                None,
            )
            .unwrap();
        let interface = tree
            .add_child(tree.root(), "interface", composite(), Some(s_interface))
            .unwrap();
        let ethernet = tree
            .add_child(interface, "ethernet", composite(), Some(s_ethernet))
            .unwrap();
        let if_eth1 = tree
            .add_child(ethernet, "eth-1", composite(), Some(s_eth_item))
            .unwrap();
        tree.add_child(
            if_eth1,
            "speed",
            NodeKind::Leaf(Value::Str("100G".into())),
            None,
        )
        .unwrap();

        (tree, schema, breakout)
    }

    #[test]
    fn select_resolves_keyed_segments() {
        let (tree, _, breakout) = fixture();
        assert_eq!(
            select(&tree, "/platform/port[eth-1]/breakout-mode"),
            Some(breakout)
        );
        assert_eq!(select(&tree, "/platform/port[eth-9]"), None);
    }

    #[test]
    fn select_canonical_round_trip() {
        let (tree, _, breakout) = fixture();
        let path = node_path(&tree, breakout);
        assert_eq!(path, "/platform/port/eth-1/breakout-mode");
        assert_eq!(select(&tree, &path), Some(breakout));
    }

    #[test]
    fn select_matches_across_branches() {
        // Each segment searches the whole remaining subtree, so a bare
        // deep name resolves without naming its ancestors.
        let (tree, _, breakout) = fixture();
        assert_eq!(select(&tree, "/breakout-mode"), Some(breakout));
    }

    #[test]
    fn select_dangling_value_suffix_returns_holder() {
        let (tree, _, breakout) = fixture();
        assert_eq!(
            select(&tree, "/platform/port[eth-1]/breakout-mode/value"),
            Some(breakout)
        );
        assert_eq!(select(&tree, "/platform/value/missing"), None);
    }

    #[test]
    fn evaluate_xpath_substitutes_item_from_ancestry() {
        let (tree, schema, breakout) = fixture();
        assert_eq!(
            evaluate_xpath(&tree, &schema, breakout, "/interface/ethernet/[@item]"),
            Some("/interface/ethernet/eth-1".into())
        );
        assert_eq!(
            evaluate_xpath(&tree, &schema, breakout, "/interface/ethernet[@item]/speed"),
            Some("/interface/ethernet[eth-1]/speed".into())
        );
        // No placeholder: path passes through untouched.
        assert_eq!(
            evaluate_xpath(&tree, &schema, breakout, "/platform/port"),
            Some("/platform/port".into())
        );
    }

    #[test]
    fn evaluate_xpath_fails_empty_without_context() {
        let (tree, schema, _) = fixture();
        // The root has no keyed-list ancestor and no anchor match.
        assert_eq!(
            evaluate_xpath(&tree, &schema, tree.root(), "/interface/ethernet/[@item]"),
            None
        );
    }

    #[test]
    fn expand_wildcard_lists_members() {
        let (mut tree, _, _) = fixture();
        let ethernet = select(&tree, "/interface/ethernet").unwrap();
        let eth2 = tree.add_child(ethernet, "eth-2", composite(), None).unwrap();
        tree.add_child(eth2, "speed", NodeKind::Leaf(Value::Str("40G".into())), None)
            .unwrap();

        let expanded = expand_wildcard(&tree, "/interface/ethernet/*/speed");
        assert_eq!(
            expanded,
            vec![
                "/interface/ethernet/eth-1/speed".to_string(),
                "/interface/ethernet/eth-2/speed".to_string(),
            ]
        );
    }

    #[test]
    fn expand_wildcard_without_star_checks_existence() {
        let (tree, _, _) = fixture();
        assert_eq!(
            expand_wildcard(&tree, "/platform/port/eth-1"),
            vec!["/platform/port/eth-1".to_string()]
        );
        assert!(expand_wildcard(&tree, "/platform/port/eth-9").is_empty());
    }

    #[test]
    fn reference_substitutes_own_name() {
        let (mut tree, mut schema, _) = fixture();
        // Give the port member schema a reference to the matching
        // interface member: interface/ethernet/@.
        let s_port_item = select(&schema, "/platform/port/@item").unwrap();
        if let NodeKind::SchemaComposite(attrs, _) = &mut schema.node_mut(s_port_item).kind {
            attrs.insert(
                attr::REFERENCE.to_string(),
                vec!["interface/ethernet/@".to_string()],
            );
        }
        let eth1 = select(&tree, "/platform/port/eth-1").unwrap();
        tree.node_mut(eth1).schema = Some(s_port_item);

        let target = resolve_reference(&tree, &schema, eth1).unwrap();
        assert_eq!(node_path(&tree, target), "/interface/ethernet/eth-1");
    }
}
