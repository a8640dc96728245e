//! Parsing raw field-selection trees into normalized [`SelectionNode`]s.
//!
//! The selection-source collaborator hands over a nested field mapping in
//! which every requested field is a key whose value is another mapping:
//! empty for scalar leaves, nested for relations. A field that accepted
//! call-time arguments carries the `"__arguments"` marker holding an
//! ordered sequence of `{ name: { "value": ... } }` pairs.
//!
//! Parsing never fails: unrecognized shapes degrade to scalar leaves.
//!
//! ```rust
//! use trellis_query::selection;
//! use serde_json::json;
//!
//! let raw = json!({
//!     "id": {},
//!     "__typename": {},
//!     "posts": { "id": {}, "title": {} }
//! });
//! let node = selection::parse(&raw, &["__typename"]);
//! assert!(node.child("id").unwrap().is_scalar_leaf());
//! assert!(node.child("posts").unwrap().is_relation());
//! assert!(node.child("__typename").is_none());
//! ```

use indexmap::IndexMap;
use serde_json::Value;
use smol_str::SmolStr;

use crate::descriptor::{CountMap, JsonObject};

/// Marker key under which the selection source attaches call arguments.
pub const ARGUMENTS_MARKER: &str = "__arguments";

/// Name of the synthetic aggregate-count field.
pub const COUNT_FIELD: &str = "_count";

/// Prefix reserved for internal/meta fields, skipped by the planners.
pub const INTERNAL_PREFIX: &str = "_";

/// Aggregate picker fields recognized on `aggregate`/`groupBy` selections.
pub const AGGREGATE_FIELDS: [&str; 5] = ["_count", "_avg", "_sum", "_min", "_max"];

/// A node in the normalized field-selection tree.
///
/// A node with non-empty `children` is a relation node; a node with empty
/// `children` and no `arguments` is a scalar leaf. Arguments and nested
/// selection are mutually exclusive per field: a field carrying the
/// arguments marker is rewritten into an argument leaf and its own nested
/// children are discarded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionNode {
    /// Field identifier (empty for the root node).
    pub name: SmolStr,
    /// Nested selection, in request order.
    pub children: IndexMap<SmolStr, SelectionNode>,
    /// Call-time arguments, present only if the field accepted them.
    pub arguments: Option<IndexMap<SmolStr, Value>>,
    /// Whether this is the synthetic aggregate-count field.
    pub is_count: bool,
}

impl SelectionNode {
    /// A scalar leaf with the given name.
    pub fn leaf(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether this node is a scalar leaf (no children, no arguments).
    pub fn is_scalar_leaf(&self) -> bool {
        self.children.is_empty() && self.arguments.is_none()
    }

    /// Whether this node is a relation node (has nested selection).
    pub fn is_relation(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether this node carries call-time arguments.
    pub fn has_arguments(&self) -> bool {
        self.arguments.is_some()
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&SelectionNode> {
        self.children.get(name)
    }

    /// The node's arguments as a JSON object (empty if none).
    pub fn arguments_object(&self) -> JsonObject {
        let mut object = JsonObject::new();
        if let Some(arguments) = &self.arguments {
            for (name, value) in arguments {
                object.insert(name.to_string(), value.clone());
            }
        }
        object
    }

    /// Render this node's subtree back into the flat requested-fields form:
    /// scalar leaves become `true`, argument leaves become their argument
    /// object, relation nodes recurse.
    pub fn to_fields_value(&self) -> Value {
        if let Some(arguments) = &self.arguments {
            let mut object = JsonObject::new();
            for (name, value) in arguments {
                object.insert(name.to_string(), value.clone());
            }
            return Value::Object(object);
        }
        if self.children.is_empty() {
            return Value::Bool(true);
        }
        let mut object = JsonObject::new();
        for (name, child) in &self.children {
            object.insert(name.to_string(), child.to_fields_value());
        }
        Value::Object(object)
    }
}

/// Parse a raw field-selection tree into a normalized root node.
///
/// Fields named in `excluded` are dropped at every depth. Malformed field
/// values (anything that is not an object) degrade to scalar leaves.
pub fn parse(raw: &Value, excluded: &[&str]) -> SelectionNode {
    let mut root = SelectionNode::default();
    if let Value::Object(fields) = raw {
        root.children = parse_children(fields, excluded);
    }
    root
}

fn parse_children(
    fields: &JsonObject,
    excluded: &[&str],
) -> IndexMap<SmolStr, SelectionNode> {
    let mut children = IndexMap::new();
    for (name, value) in fields {
        if excluded.contains(&name.as_str()) {
            continue;
        }
        children.insert(SmolStr::from(name), parse_field(name, value, excluded));
    }
    children
}

fn parse_field(name: &str, value: &Value, excluded: &[&str]) -> SelectionNode {
    let mut node = SelectionNode::leaf(name);
    node.is_count = name == COUNT_FIELD;

    let Value::Object(fields) = value else {
        return node;
    };

    if let Some(marker) = fields.get(ARGUMENTS_MARKER) {
        // Arguments and nested selection are mutually exclusive: the nested
        // children of an argument-carrying field are discarded here.
        node.arguments = Some(parse_arguments(marker));
        return node;
    }

    node.children = parse_children(fields, excluded);
    node
}

fn parse_arguments(marker: &Value) -> IndexMap<SmolStr, Value> {
    let mut arguments = IndexMap::new();
    let Value::Array(entries) = marker else {
        return arguments;
    };
    for entry in entries {
        let Value::Object(pair) = entry else {
            continue;
        };
        for (name, payload) in pair {
            let value = match payload {
                Value::Object(inner) if inner.contains_key("value") => inner["value"].clone(),
                other => other.clone(),
            };
            arguments.insert(SmolStr::from(name), value);
        }
    }
    arguments
}

/// Extract the aggregate-count request from a selection: relation name to
/// `true` (plain count) or the filter object the caller attached.
///
/// Returns `None` when the selection has no usable `_count` entry.
pub fn count_selection(node: &SelectionNode) -> Option<CountMap> {
    let count = node.child(COUNT_FIELD)?;
    let mut request = CountMap::new();
    for (name, child) in &count.children {
        let value = if child.has_arguments() {
            Value::Object(child.arguments_object())
        } else {
            Value::Bool(true)
        };
        request.insert(name.clone(), value);
    }
    if request.is_empty() { None } else { Some(request) }
}

/// Extract the aggregate pickers (`_count`/`_avg`/`_sum`/`_min`/`_max`)
/// requested by an `aggregate` or `groupBy` selection, dropping absent
/// members.
pub fn aggregate_selection(node: &SelectionNode) -> JsonObject {
    let mut pickers = JsonObject::new();
    for name in AGGREGATE_FIELDS {
        if let Some(child) = node.child(name) {
            pickers.insert(name.to_string(), child.to_fields_value());
        }
    }
    pickers
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_scalar_and_relation_nodes() {
        let raw = json!({
            "id": {},
            "name": {},
            "posts": { "id": {}, "title": {} }
        });
        let node = parse(&raw, &[]);

        assert!(node.child("id").unwrap().is_scalar_leaf());
        assert!(node.child("posts").unwrap().is_relation());
        assert_eq!(
            node.child("posts").unwrap().child("title").unwrap().name,
            "title"
        );
    }

    #[test]
    fn test_excluded_names_dropped_at_every_depth() {
        let raw = json!({
            "__typename": {},
            "posts": { "__typename": {}, "id": {} }
        });
        let node = parse(&raw, &["__typename"]);

        assert!(node.child("__typename").is_none());
        let posts = node.child("posts").unwrap();
        assert!(posts.child("__typename").is_none());
        assert!(posts.child("id").is_some());
    }

    #[test]
    fn test_arguments_marker_rewrites_to_leaf() {
        let raw = json!({
            "posts": {
                "__arguments": [
                    { "take": { "value": 5 } },
                    { "where": { "value": { "published": true } } }
                ],
                "id": {}
            }
        });
        let node = parse(&raw, &[]);
        let posts = node.child("posts").unwrap();

        assert!(posts.has_arguments());
        assert!(!posts.is_relation());
        let arguments = posts.arguments.as_ref().unwrap();
        assert_eq!(arguments["take"], json!(5));
        assert_eq!(arguments["where"], json!({ "published": true }));
        // Argument order is the request order.
        assert_eq!(
            arguments.keys().map(SmolStr::as_str).collect::<Vec<_>>(),
            ["take", "where"]
        );
    }

    #[test]
    fn test_malformed_shapes_degrade_to_scalar_leaves() {
        let raw = json!({
            "ok": {},
            "odd": 42,
            "weird": [1, 2],
            "broken": { "__arguments": "not-an-array" }
        });
        let node = parse(&raw, &[]);

        assert!(node.child("odd").unwrap().is_scalar_leaf());
        assert!(node.child("weird").unwrap().is_scalar_leaf());
        let broken = node.child("broken").unwrap();
        assert!(broken.has_arguments());
        assert!(broken.arguments.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_count_field_flagged() {
        let raw = json!({ "_count": { "posts": {} } });
        let node = parse(&raw, &[]);
        assert!(node.child("_count").unwrap().is_count);
    }

    #[test]
    fn test_count_selection_plain_and_filtered() {
        let raw = json!({
            "_count": {
                "posts": { "__arguments": [{ "where": { "value": { "color": "RED" } } }] },
                "comments": {}
            }
        });
        let node = parse(&raw, &[]);
        let request = count_selection(&node).unwrap();

        assert_eq!(request["posts"], json!({ "where": { "color": "RED" } }));
        assert_eq!(request["comments"], json!(true));
    }

    #[test]
    fn test_count_selection_absent() {
        let node = parse(&json!({ "id": {} }), &[]);
        assert_eq!(count_selection(&node), None);

        let empty = parse(&json!({ "_count": {} }), &[]);
        assert_eq!(count_selection(&empty), None);
    }

    #[test]
    fn test_aggregate_selection_drops_absent_members() {
        let raw = json!({
            "_count": { "_all": {} },
            "_avg": { "age": {} },
            "other": {}
        });
        let node = parse(&raw, &[]);
        let pickers = aggregate_selection(&node);

        assert_eq!(
            serde_json::to_value(&pickers).unwrap(),
            json!({ "_count": { "_all": true }, "_avg": { "age": true } })
        );
    }

    #[test]
    fn test_to_fields_value_round_trip() {
        let raw = json!({
            "id": {},
            "posts": { "id": {}, "author": { "name": {} } }
        });
        let node = parse(&raw, &[]);
        assert_eq!(
            node.to_fields_value(),
            json!({
                "id": true,
                "posts": { "id": true, "author": { "name": true } }
            })
        );
    }
}
