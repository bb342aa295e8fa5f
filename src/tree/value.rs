//! Leaf value union.

use crate::tree::{NodeId, Tree};

/// Scalar or list content held by a leaf node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    StrList(Vec<String>),
    /// References into the owning tree's arena. Never produced by the
    /// JSON builders; carried for callers that collect nodes as a value.
    NodeList(Vec<NodeId>),
}

impl Value {
    /// Convert a scalar or scalar-array JSON value. Objects and mixed
    /// arrays have no leaf representation and return `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
            serde_json::Value::String(s) => Some(Value::Str(s.clone())),
            serde_json::Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        serde_json::Value::String(s) => list.push(s.clone()),
                        // Non-string members are rendered through their
                        // canonical JSON form so the list stays homogeneous.
                        other => list.push(other.to_string()),
                    }
                }
                Some(Value::StrList(list))
            }
            _ => None,
        }
    }

    /// Render back to JSON. Node lists render as the referenced node
    /// names, which requires the owning tree.
    pub fn to_json(&self, tree: &Tree) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::StrList(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
            Value::NodeList(ids) => serde_json::Value::Array(
                ids.iter()
                    .map(|id| serde_json::Value::String(tree.name(*id).to_string()))
                    .collect(),
            ),
        }
    }

    /// String rendering used when a value is compared or substituted as
    /// a path key.
    pub fn as_key_string(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::StrList(_) | Value::NodeList(_) => None,
        }
    }
}
