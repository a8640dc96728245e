//! Compiling selection trees into store query descriptors.
//!
//! Two independent compilation strategies exist for the same tree:
//!
//! - **Select mode** ([`plan_select`]) is field-exact: every scalar leaf
//!   maps to `true`, every relation node to `{ select: <nested> }`. Used
//!   for the read operations.
//! - **Include mode** ([`plan_include`]) keeps all native scalars implicit
//!   and emits only relation nodes. An empty result is `None`, so the
//!   store receives no `include` key at all rather than `include: {}`.
//!
//! Select mode takes priority whenever it can be computed; the two modes
//! are never combined in one descriptor. Internal fields (the reserved
//! `_` prefix, including the synthetic `_count`) are skipped by both
//! planners; the count merger folds them in separately.

use tracing::debug;

use crate::descriptor::{
    IncludeField, IncludeMap, JsonObject, QueryArgs, QueryDescriptor, SelectField, SelectMap,
};
use crate::selection::{INTERNAL_PREFIX, SelectionNode};

/// Compile a selection tree into a field-exact `select` map.
pub fn plan_select(node: &SelectionNode) -> SelectMap {
    let mut select = SelectMap::new();
    for (name, child) in &node.children {
        if name.starts_with(INTERNAL_PREFIX) {
            continue;
        }
        if child.is_relation() {
            select.insert(name.clone(), SelectField::Relation(plan_select(child)));
        } else {
            // Scalar leaves and argument leaves are both requested fields.
            select.insert(name.clone(), SelectField::Scalar);
        }
    }
    select
}

/// Compile a selection tree into a relations-only `include` map, or `None`
/// if the tree names no relations.
pub fn plan_include(node: &SelectionNode) -> Option<IncludeMap> {
    let mut include = IncludeMap::new();
    for (name, child) in &node.children {
        if name.starts_with(INTERNAL_PREFIX) {
            continue;
        }
        if child.is_relation() {
            include.insert(name.clone(), IncludeField::Relation(plan_select(child)));
        }
    }
    if include.is_empty() { None } else { Some(include) }
}

/// Build a select-mode query descriptor from caller arguments and a
/// selection tree.
///
/// The caller's arguments pass through untouched; the compiled `select` is
/// attached when non-empty, and `extra_where` conditions are
/// shallow-merged into `where` with the extra conditions winning on key
/// collision.
pub fn build_query(
    args: QueryArgs,
    node: &SelectionNode,
    extra_where: Option<JsonObject>,
) -> QueryDescriptor {
    let mut descriptor = QueryDescriptor::from(args);
    let select = plan_select(node);
    if !select.is_empty() {
        descriptor.select = Some(select);
    }
    if let Some(extra) = extra_where {
        descriptor.merge_where(extra);
    }
    debug!(fields = descriptor.select.as_ref().map_or(0, SelectMap::len), "planned select query");
    descriptor
}

/// Build an include-mode query descriptor from caller arguments and a
/// selection tree.
///
/// Identical to [`build_query`] but substitutes the relations-only
/// `include`; when the selection names no relations the descriptor carries
/// no `include` key at all.
pub fn build_query_with_include(
    args: QueryArgs,
    node: &SelectionNode,
    extra_where: Option<JsonObject>,
) -> QueryDescriptor {
    let mut descriptor = QueryDescriptor::from(args);
    descriptor.include = plan_include(node);
    if let Some(extra) = extra_where {
        descriptor.merge_where(extra);
    }
    descriptor
}
