//! Tree construction from JSON documents.

use regex::Regex;
use serde_json::Value as Json;

use crate::tree::{attr, AttrMap, NodeId, NodeKind, Tree, TreeError, Value, ITEM_NODE};

/// Build the schema tree from a JSON Schema document.
///
/// `properties` entries become named schema children;
/// `patternProperties` turn the parent into a pattern-keyed container
/// carrying the key regex as `pattern-name` and the member schema as an
/// `@item` child. Recognized custom attributes are copied into the
/// attribute map in document order.
pub fn build_schema_tree(doc: &Json) -> Result<Tree, TreeError> {
    let mut tree = Tree::new_schema("schema");
    if let Some(obj) = doc.as_object() {
        let root = tree.root();
        build_schema_children(&mut tree, root, obj)?;
    }
    Ok(tree)
}

fn build_schema_children(
    tree: &mut Tree,
    parent: NodeId,
    obj: &serde_json::Map<String, Json>,
) -> Result<(), TreeError> {
    if let Some(props) = obj.get("properties").and_then(Json::as_object) {
        for (name, sub) in props {
            build_schema_node(tree, parent, name, sub)?;
        }
    }
    if let Some(patterns) = obj.get("patternProperties").and_then(Json::as_object) {
        for (index, (pattern, sub)) in patterns.iter().enumerate() {
            push_attr(tree, parent, attr::PATTERN_NAME, pattern);
            // One `@item` member schema; additional patterns only widen
            // the accepted key set.
            if index == 0 {
                build_schema_node(tree, parent, ITEM_NODE, sub)?;
            }
        }
    }
    Ok(())
}

fn build_schema_node(
    tree: &mut Tree,
    parent: NodeId,
    name: &str,
    sub: &Json,
) -> Result<(), TreeError> {
    let empty = serde_json::Map::new();
    let obj = sub.as_object().unwrap_or(&empty);
    let attrs = collect_attrs(obj);
    let is_container =
        obj.contains_key("properties") || obj.contains_key("patternProperties");
    if is_container {
        let id = tree.add_child(
            parent,
            name,
            NodeKind::SchemaComposite(attrs, Default::default()),
            None,
        )?;
        build_schema_children(tree, id, obj)?;
    } else {
        tree.add_child(parent, name, NodeKind::SchemaLeaf(attrs), None)?;
    }
    Ok(())
}

/// Copy recognized custom keywords into an attribute map, preserving
/// order and duplicate entries. The JSON Schema `pattern` keyword maps
/// to `pattern-value`.
fn collect_attrs(obj: &serde_json::Map<String, Json>) -> AttrMap {
    let mut attrs = AttrMap::new();
    for (key, value) in obj {
        let name = match key.as_str() {
            "pattern" => attr::PATTERN_VALUE,
            other if attr::ALL.contains(&other) => other,
            _ => continue,
        };
        let values = match value {
            Json::String(s) => vec![s.clone()],
            Json::Array(items) => items
                .iter()
                .map(|item| match item {
                    Json::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Json::Bool(b) => vec![b.to_string()],
            Json::Number(n) => vec![n.to_string()],
            _ => continue,
        };
        attrs
            .entry(name.to_string())
            .or_default()
            .extend(values);
    }
    attrs
}

fn push_attr(tree: &mut Tree, id: NodeId, name: &str, value: &str) {
    if let NodeKind::SchemaComposite(attrs, _) | NodeKind::SchemaLeaf(attrs) =
        &mut tree.node_mut(id).kind
    {
        attrs
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }
}

/// Build a schema-linked configuration tree from a JSON document.
pub fn build_config_tree(doc: &Json, schema: &Tree) -> Result<Tree, TreeError> {
    let mut tree = Tree::new("config");
    if let Some(obj) = doc.as_object() {
        let root = tree.root();
        populate(&mut tree, root, obj, schema, Some(schema.root()))?;
    }
    Ok(tree)
}

fn populate(
    tree: &mut Tree,
    parent: NodeId,
    obj: &serde_json::Map<String, Json>,
    schema: &Tree,
    schema_parent: Option<NodeId>,
) -> Result<(), TreeError> {
    for (name, value) in obj {
        let schema_node =
            schema_parent.and_then(|sp| match_child_schema(schema, sp, name));
        match value {
            Json::Object(child) => {
                let id = tree.add_child(
                    parent,
                    name,
                    NodeKind::Composite(Default::default()),
                    schema_node,
                )?;
                populate(tree, id, child, schema, schema_node)?;
            }
            scalar => {
                if let Some(leaf) = Value::from_json(scalar) {
                    tree.add_child(parent, name, NodeKind::Leaf(leaf), schema_node)?;
                }
            }
        }
    }
    Ok(())
}

/// Find the schema child governing a named config child: an exact
/// `properties` match first, then the `@item` member schema when one of
/// the container's key patterns accepts the name.
pub fn match_child_schema(schema: &Tree, parent: NodeId, name: &str) -> Option<NodeId> {
    if let Some(direct) = schema.child(parent, name) {
        return Some(direct);
    }
    let item = schema.child(parent, ITEM_NODE)?;
    for pattern in schema.attr_values(parent, attr::PATTERN_NAME) {
        if let Ok(re) = Regex::new(pattern) {
            if re.is_match(name) {
                return Some(item);
            }
        }
    }
    None
}

/// Apply a JSON merge patch: objects merge recursively, scalars and
/// arrays replace or create leaves, `null` deletes. Newly created nodes
/// are linked to their governing schema.
pub fn apply_patch(tree: &mut Tree, schema: &Tree, patch: &Json) -> Result<(), TreeError> {
    if let Some(obj) = patch.as_object() {
        let root = tree.root();
        merge(tree, root, obj, schema, Some(schema.root()))?;
    }
    Ok(())
}

fn merge(
    tree: &mut Tree,
    node: NodeId,
    patch: &serde_json::Map<String, Json>,
    schema: &Tree,
    schema_ctx: Option<NodeId>,
) -> Result<(), TreeError> {
    for (name, value) in patch {
        match value {
            Json::Null => {
                // Deleting an absent child is a no-op.
                let _ = tree.remove_child(node, name);
            }
            Json::Object(child_patch) => {
                let child = match tree.child(node, name) {
                    Some(existing) if tree.children(existing).is_some() => existing,
                    _ => {
                        let schema_node = schema_ctx
                            .and_then(|sc| match_child_schema(schema, sc, name));
                        tree.add_child(
                            node,
                            name,
                            NodeKind::Composite(Default::default()),
                            schema_node,
                        )?
                    }
                };
                let child_schema = tree.schema_of(child);
                merge(tree, child, child_patch, schema, child_schema)?;
            }
            scalar => {
                let Some(leaf) = Value::from_json(scalar) else {
                    continue;
                };
                match tree.child(node, name) {
                    Some(existing) if tree.leaf_value(existing).is_some() => {
                        tree.set_leaf_value(existing, leaf);
                    }
                    _ => {
                        let schema_node = schema_ctx
                            .and_then(|sc| match_child_schema(schema, sc, name));
                        tree.add_child(node, name, NodeKind::Leaf(leaf), schema_node)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Enforce schema `min`/`max` child bounds against materialized counts.
/// Returns one message per violated container.
pub fn check_bounds(tree: &Tree, schema: &Tree) -> Vec<String> {
    let mut violations = Vec::new();
    let _ = tree.visit(tree.root(), &mut |id| {
        if let Some(schema_node) = tree.schema_of(id) {
            let count = tree.count(id);
            if let Some(min) = parse_bound(schema.attr_first(schema_node, attr::MIN)) {
                if count < min {
                    violations.push(format!(
                        "{}: {} member(s), schema requires at least {}",
                        crate::path::node_path(tree, id),
                        count,
                        min
                    ));
                }
            }
            if let Some(max) = parse_bound(schema.attr_first(schema_node, attr::MAX)) {
                if count > max {
                    violations.push(format!(
                        "{}: {} member(s), schema allows at most {}",
                        crate::path::node_path(tree, id),
                        count,
                        max
                    ));
                }
            }
        }
        std::ops::ControlFlow::Continue(())
    });
    violations
}

fn parse_bound(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_doc() -> Json {
        json!({
            "type": "object",
            "properties": {
                "platform": {
                    "type": "object",
                    "properties": {
                        "port": {
                            "type": "object",
                            "max": "2",
                            "patternProperties": {
                                "^eth-[0-9]+$": {
                                    "type": "object",
                                    "properties": {
                                        "breakout-mode": {
                                            "type": "string",
                                            "default": "none"
                                        },
                                        "lanes": { "type": "array" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    fn config_doc() -> Json {
        json!({
            "platform": {
                "port": {
                    "eth-1": {
                        "breakout-mode": "none",
                        "lanes": ["1", "2", "3", "4"]
                    }
                }
            }
        })
    }

    #[test]
    fn schema_tree_has_item_member() {
        let schema = build_schema_tree(&schema_doc()).unwrap();
        let port = crate::path::select(&schema, "/platform/port").unwrap();
        assert_eq!(
            schema.attr_values(port, attr::PATTERN_NAME),
            ["^eth-[0-9]+$".to_string()]
        );
        let item = schema.child(port, ITEM_NODE).unwrap();
        let breakout = schema.child(item, "breakout-mode").unwrap();
        assert_eq!(schema.attr_first(breakout, attr::DEFAULT), Some("none"));
    }

    #[test]
    fn config_tree_links_pattern_members_to_item_schema() {
        let schema = build_schema_tree(&schema_doc()).unwrap();
        let tree = build_config_tree(&config_doc(), &schema).unwrap();

        let eth1 = crate::path::select(&tree, "/platform/port/eth-1").unwrap();
        let item = {
            let port = crate::path::select(&schema, "/platform/port").unwrap();
            schema.child(port, ITEM_NODE).unwrap()
        };
        assert_eq!(tree.schema_of(eth1), Some(item));

        let lanes = crate::path::select(&tree, "/platform/port/eth-1/lanes").unwrap();
        assert_eq!(
            tree.leaf_value(lanes),
            Some(&Value::StrList(vec![
                "1".into(),
                "2".into(),
                "3".into(),
                "4".into()
            ]))
        );
    }

    #[test]
    fn round_trip_through_dump() {
        let schema = build_schema_tree(&schema_doc()).unwrap();
        let tree = build_config_tree(&config_doc(), &schema).unwrap();
        let dumped = tree.to_json(tree.root());
        let rebuilt = build_config_tree(&dumped, &schema).unwrap();
        assert!(tree.same_shape(&rebuilt));
    }

    #[test]
    fn patch_merges_deletes_and_creates() {
        let schema = build_schema_tree(&schema_doc()).unwrap();
        let mut tree = build_config_tree(&config_doc(), &schema).unwrap();

        apply_patch(
            &mut tree,
            &schema,
            &json!({
                "platform": {
                    "port": {
                        "eth-1": { "breakout-mode": "4x25G" },
                        "eth-2": { "breakout-mode": "none" }
                    }
                }
            }),
        )
        .unwrap();

        let breakout = crate::path::select(&tree, "/platform/port/eth-1/breakout-mode").unwrap();
        assert_eq!(tree.leaf_value(breakout), Some(&Value::Str("4x25G".into())));
        assert!(crate::path::select(&tree, "/platform/port/eth-2").is_some());

        apply_patch(
            &mut tree,
            &schema,
            &json!({ "platform": { "port": { "eth-2": null } } }),
        )
        .unwrap();
        assert!(crate::path::select(&tree, "/platform/port/eth-2").is_none());
    }

    #[test]
    fn bounds_violations_are_reported() {
        let schema = build_schema_tree(&schema_doc()).unwrap();
        let mut tree = build_config_tree(&config_doc(), &schema).unwrap();
        assert!(check_bounds(&tree, &schema).is_empty());

        apply_patch(
            &mut tree,
            &schema,
            &json!({
                "platform": {
                    "port": {
                        "eth-2": { "breakout-mode": "none" },
                        "eth-3": { "breakout-mode": "none" }
                    }
                }
            }),
        )
        .unwrap();
        let violations = check_bounds(&tree, &schema);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("/platform/port"));
    }
}
