//! Store-native query descriptors.
//!
//! A [`QueryDescriptor`] is what the planner hands to the store-access
//! collaborator: the caller's opaque filter/sort/pagination arguments plus
//! exactly one of a field-exact `select` tree or a relations-only `include`
//! tree. Serialization produces the store wire shape directly: absent
//! parts never serialize, and nested relation entries always take the
//! `{ "select": ... }` form, never a bare boolean.
//!
//! ```rust
//! use trellis_query::{QueryArgs, QueryDescriptor};
//! use serde_json::json;
//!
//! let args = QueryArgs::new().take(10);
//! let descriptor = QueryDescriptor::from(args);
//! assert_eq!(serde_json::to_value(&descriptor).unwrap(), json!({ "take": 10 }));
//! ```

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use smol_str::SmolStr;

/// A JSON object, used for opaque pass-through payloads (`where`, `data`).
pub type JsonObject = serde_json::Map<String, Value>;

/// A planned field-exact selection: field name to [`SelectField`].
pub type SelectMap = IndexMap<SmolStr, SelectField>;

/// A planned relations-only inclusion: relation name to [`IncludeField`].
pub type IncludeMap = IndexMap<SmolStr, IncludeField>;

/// Requested aggregate counts: relation name to `true` or a filter object.
pub type CountMap = IndexMap<SmolStr, Value>;

/// One entry in a `select` tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    /// A scalar leaf; serializes as `true`.
    Scalar,
    /// A relation with its own nested selection; serializes as
    /// `{ "select": <nested> }`.
    Relation(SelectMap),
    /// A relation carrying full caller arguments alongside its selection;
    /// serializes as the embedded descriptor object. Never produced by the
    /// planner; built by the direct relation resolution path.
    Query(Box<QueryDescriptor>),
}

impl Serialize for SelectField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar => serializer.serialize_bool(true),
            Self::Relation(select) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("select", select)?;
                map.end()
            }
            Self::Query(descriptor) => descriptor.serialize(serializer),
        }
    }
}

/// One entry in an `include` tree.
#[derive(Debug, Clone, PartialEq)]
pub enum IncludeField {
    /// A relation with its nested selection; serializes as
    /// `{ "select": <nested> }`.
    Relation(SelectMap),
    /// The synthetic `_count` aggregate entry; serializes as
    /// `{ "select": <relation: true | filter> }`.
    Count(CountMap),
}

impl Serialize for IncludeField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Relation(select) => map.serialize_entry("select", select)?,
            Self::Count(counts) => map.serialize_entry("select", counts)?,
        }
        map.end()
    }
}

/// Caller-supplied filter/sort/pagination arguments.
///
/// All parts are opaque pass-through: the planner never interprets them
/// beyond shallow-merging extra `where` conditions. Unrecognized keys are
/// preserved in `extra` per the uniform `{ ...args, ...overrides }`
/// argument-merging contract.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryArgs {
    /// Filter conditions.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<JsonObject>,
    /// Sort specification.
    #[serde(rename = "orderBy", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Value>,
    /// Cursor for cursor-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Value>,
    /// Maximum number of records to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take: Option<i64>,
    /// Number of records to skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
    /// Distinct columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct: Option<Vec<SmolStr>>,
    /// Write payload for create/update/upsert operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonObject>,
    /// Any remaining caller-supplied keys, passed through untouched.
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl QueryArgs {
    /// Empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse arguments from a JSON object value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Set the filter conditions.
    pub fn r#where(mut self, filter: JsonObject) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the sort specification.
    pub fn order_by(mut self, order_by: Value) -> Self {
        self.order_by = Some(order_by);
        self
    }

    /// Set the record limit.
    pub fn take(mut self, n: i64) -> Self {
        self.take = Some(n);
        self
    }

    /// Set the records-to-skip count.
    pub fn skip(mut self, n: i64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Set the write payload.
    pub fn data(mut self, data: JsonObject) -> Self {
        self.data = Some(data);
        self
    }
}

/// The planner's output: caller arguments plus the compiled selection.
///
/// Invariant: at most one of `select`/`include` is populated. The builders
/// in [`plan`](crate::plan) and [`count`](crate::count) maintain this:
/// select mode is field-exact and takes precedence; include mode adds
/// relations (and the `_count` aggregate) on top of all scalars.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct QueryDescriptor {
    /// Filter conditions.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<JsonObject>,
    /// Sort specification.
    #[serde(rename = "orderBy", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Value>,
    /// Cursor for cursor-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Value>,
    /// Maximum number of records to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take: Option<i64>,
    /// Number of records to skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
    /// Distinct columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct: Option<Vec<SmolStr>>,
    /// Write payload for create/update/upsert operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonObject>,
    /// Field-exact selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<SelectMap>,
    /// Relations-only inclusion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<IncludeMap>,
    /// Remaining pass-through keys (aggregate pickers, `by` for groupBy).
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl QueryDescriptor {
    /// Empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow-merge extra conditions into `where`; extra conditions win on
    /// key collision.
    pub fn merge_where(&mut self, extra: JsonObject) {
        if extra.is_empty() {
            return;
        }
        let filter = self.filter.get_or_insert_with(JsonObject::new);
        for (key, value) in extra {
            filter.insert(key, value);
        }
    }

    /// The normalized argument signature of this descriptor, used to decide
    /// whether two pending loads belong in the same batch.
    pub fn signature(&self) -> SmolStr {
        SmolStr::from(serde_json::to_string(self).unwrap_or_default())
    }
}

impl From<QueryArgs> for QueryDescriptor {
    fn from(args: QueryArgs) -> Self {
        Self {
            filter: args.filter,
            order_by: args.order_by,
            cursor: args.cursor,
            take: args.take,
            skip: args.skip,
            distinct: args.distinct,
            data: args.data,
            select: None,
            include: None,
            extra: args.extra,
        }
    }
}
