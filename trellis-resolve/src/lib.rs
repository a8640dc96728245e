//! # trellis-resolve
//!
//! Request-scoped batched relation loading for the Trellis graph query
//! resolver.
//!
//! This crate solves the N+1 problem: when many sibling nodes in a result
//! graph each need the same kind of related data, their lookups are
//! coalesced into one store call per relation per batching window,
//! deduplicated, and the results remapped back to each original
//! requester. It provides:
//! - The generic [`BatchLoader`] window state machine
//! - The [`RelationLoader`] issuing membership-predicate `findMany` calls
//! - The [`LoaderRegistry`] sharing loaders across sibling resolutions
//! - The [`RequestContext`] owning everything request-scoped
//! - High-level [`resolver`] entry points for each operation kind
//!
//! ## Batched relation resolution
//!
//! ```rust,ignore
//! use trellis_resolve::{RequestContext, resolver};
//!
//! let ctx = RequestContext::new(store);
//! // Three siblings resolving `posts` issue one findMany with
//! // `where: { authorId: { in: [1, 2, 3] } }`.
//! let (a, b, c) = tokio::join!(
//!     resolver::resolve_relation(&ctx, &user, "posts", &row_1, &node, args.clone()),
//!     resolver::resolve_relation(&ctx, &user, "posts", &row_2, &node, args.clone()),
//!     resolver::resolve_relation(&ctx, &user, "posts", &row_3, &node, args),
//! );
//! ```

pub mod batch;
pub mod context;
pub mod key;
pub mod registry;
pub mod relation;
pub mod resolver;

pub use batch::{BatchFn, BatchLoader, LoaderOptions};
pub use context::{DEFAULT_STORE_SLOT, RequestContext, RequestContextBuilder};
pub use key::ParentKey;
pub use registry::{LoaderKey, LoaderRegistry};
pub use relation::RelationLoader;
pub use resolver::{
    resolve_aggregate, resolve_find, resolve_group_by, resolve_relation,
    resolve_relation_direct, resolve_write,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::batch::{BatchFn, BatchLoader, LoaderOptions};
    pub use crate::context::{RequestContext, RequestContextBuilder};
    pub use crate::key::ParentKey;
    pub use crate::registry::{LoaderKey, LoaderRegistry};
    pub use crate::relation::RelationLoader;
    pub use crate::resolver::{
        resolve_aggregate, resolve_find, resolve_group_by, resolve_relation,
        resolve_relation_direct, resolve_write,
    };
    pub use trellis_query::prelude::*;
}
