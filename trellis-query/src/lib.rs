//! # trellis-query
//!
//! Selection-to-query planning for the Trellis graph query resolver.
//!
//! This crate turns a nested field-selection request into the minimal
//! store-native query descriptor: which columns, which relations, how
//! deep. It provides:
//! - Parsing of raw selection trees into normalized [`SelectionNode`]s
//! - The select/include planners and the descriptor builders
//! - The replaceable argument pipeline with its side-effect sink
//! - The aggregate-count merger
//! - Entity metadata and unique-filter-key resolution
//! - The [`Store`] trait that query execution backends implement
//!
//! ## Planning a selection
//!
//! ```rust
//! use trellis_query::{selection, plan, QueryArgs};
//! use serde_json::json;
//!
//! let raw = json!({
//!     "id": {},
//!     "name": {},
//!     "posts": { "id": {}, "title": {} }
//! });
//! let node = selection::parse(&raw, &["__typename"]);
//! let descriptor = plan::build_query(QueryArgs::new(), &node, None);
//!
//! assert_eq!(
//!     serde_json::to_value(&descriptor).unwrap(),
//!     json!({
//!         "select": {
//!             "id": true,
//!             "name": true,
//!             "posts": { "select": { "id": true, "title": true } }
//!         }
//!     })
//! );
//! ```
//!
//! ## Merging relation counts
//!
//! ```rust
//! use trellis_query::{count, QueryDescriptor, CountMap};
//! use serde_json::json;
//!
//! let mut request = CountMap::new();
//! request.insert("posts".into(), json!({ "where": { "color": "RED" } }));
//! request.insert("comments".into(), json!(null));
//!
//! let merged = count::merge_count(Some(request), QueryDescriptor::new());
//! assert_eq!(
//!     serde_json::to_value(&merged).unwrap(),
//!     json!({
//!         "include": { "_count": { "select": { "posts": { "where": { "color": "RED" } } } } }
//!     })
//! );
//! ```

pub mod count;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod meta;
pub mod operations;
pub mod plan;
pub mod selection;
pub mod store;
pub mod transform;

pub use count::{merge_aggregate, merge_count};
pub use descriptor::{
    CountMap, IncludeField, IncludeMap, JsonObject, QueryArgs, QueryDescriptor, SelectField,
    SelectMap,
};
pub use error::{ErrorCode, QueryError, QueryResult};
pub use meta::{CompositeKey, EntityMeta, FieldMeta, FilterKey, RelationMeta};
pub use operations::Operation;
pub use plan::{build_query, build_query_with_include, plan_include, plan_select};
pub use selection::{SelectionNode, count_selection, parse};
pub use store::Store;
pub use transform::{ArgsPipeline, ArgsTransform, ContextValues, IdentityTransform, SideEffects};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::count::{merge_aggregate, merge_count};
    pub use crate::descriptor::{
        CountMap, IncludeField, IncludeMap, JsonObject, QueryArgs, QueryDescriptor, SelectField,
        SelectMap,
    };
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::meta::{CompositeKey, EntityMeta, FieldMeta, FilterKey, RelationMeta};
    pub use crate::operations::Operation;
    pub use crate::plan::{build_query, build_query_with_include, plan_include, plan_select};
    pub use crate::selection::{SelectionNode, parse};
    pub use crate::store::Store;
    pub use crate::transform::{ArgsPipeline, ArgsTransform, ContextValues, SideEffects};
}
