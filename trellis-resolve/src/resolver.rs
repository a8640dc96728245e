//! Resolver entry points: the glue from a parsed selection to a store
//! call.
//!
//! Each entry point follows the same sequence: retrieve the store handle,
//! run the argument pipeline, compile the selection into a descriptor the
//! way the operation requires, execute, then run any registered side
//! effects against the result. Relation fields go through the
//! request-scoped batching loader instead of issuing one call per parent.

use serde_json::Value;
use tracing::debug;

use trellis_query::{
    EntityMeta, JsonObject, Operation, QueryArgs, QueryDescriptor, QueryError, QueryResult,
    RelationMeta, SelectField, SelectMap, SelectionNode, count, meta, plan, selection,
    transform::SideEffects,
};

use crate::context::RequestContext;
use crate::registry::LoaderKey;
use crate::relation::RelationLoader;

/// Resolve a read operation, compiling the selection into a field-exact
/// `select`.
pub async fn resolve_find(
    ctx: &RequestContext,
    entity: &EntityMeta,
    operation: Operation,
    node: &SelectionNode,
    args: QueryArgs,
) -> QueryResult<Value> {
    if !operation.is_select_optimized() {
        return Err(QueryError::invalid_configuration(format!(
            "`{operation}` is not a select-compiled read operation"
        )));
    }
    let store = ctx.store()?;
    let mut effects = SideEffects::new();
    let args = ctx
        .pipeline()
        .apply(
            node,
            args,
            ctx.values(),
            &entity.name,
            &entity.collection,
            operation,
            &mut effects,
        )
        .await?;
    let query = plan::build_query(args, node, None);
    debug!(entity = %entity.name, operation = %operation, "executing find");
    let result = store.execute(&entity.collection, operation, query).await?;
    effects.run(&result).await?;
    Ok(result)
}

/// Resolve a write (or other non-select-compiled) operation, folding any
/// requested relation counts into the descriptor's `include`.
pub async fn resolve_write(
    ctx: &RequestContext,
    entity: &EntityMeta,
    operation: Operation,
    node: &SelectionNode,
    args: QueryArgs,
) -> QueryResult<Value> {
    if operation.is_select_optimized()
        || matches!(operation, Operation::Aggregate | Operation::GroupBy)
    {
        return Err(QueryError::invalid_configuration(format!(
            "`{operation}` has a dedicated resolution path"
        )));
    }
    let store = ctx.store()?;
    let mut effects = SideEffects::new();
    let args = ctx
        .pipeline()
        .apply(
            node,
            args,
            ctx.values(),
            &entity.name,
            &entity.collection,
            operation,
            &mut effects,
        )
        .await?;
    let query = count::merge_count(selection::count_selection(node), QueryDescriptor::from(args));
    debug!(entity = %entity.name, operation = %operation, "executing write");
    let result = store.execute(&entity.collection, operation, query).await?;
    effects.run(&result).await?;
    Ok(result)
}

/// Resolve an `aggregate` operation, merging the requested aggregate
/// pickers over the caller's arguments.
pub async fn resolve_aggregate(
    ctx: &RequestContext,
    entity: &EntityMeta,
    node: &SelectionNode,
    args: QueryArgs,
) -> QueryResult<Value> {
    resolve_with_pickers(ctx, entity, Operation::Aggregate, node, args).await
}

/// Resolve a `groupBy` operation; absent aggregate members are dropped
/// before the descriptor reaches the store.
pub async fn resolve_group_by(
    ctx: &RequestContext,
    entity: &EntityMeta,
    node: &SelectionNode,
    args: QueryArgs,
) -> QueryResult<Value> {
    resolve_with_pickers(ctx, entity, Operation::GroupBy, node, args).await
}

async fn resolve_with_pickers(
    ctx: &RequestContext,
    entity: &EntityMeta,
    operation: Operation,
    node: &SelectionNode,
    args: QueryArgs,
) -> QueryResult<Value> {
    let store = ctx.store()?;
    let mut effects = SideEffects::new();
    let args = ctx
        .pipeline()
        .apply(
            node,
            args,
            ctx.values(),
            &entity.name,
            &entity.collection,
            operation,
            &mut effects,
        )
        .await?;
    let query = count::merge_aggregate(
        selection::aggregate_selection(node),
        QueryDescriptor::from(args),
    );
    debug!(entity = %entity.name, operation = %operation, "executing aggregate");
    let result = store.execute(&entity.collection, operation, query).await?;
    effects.run(&result).await?;
    Ok(result)
}

/// Resolve a relation field for one parent row through the request's
/// batching loader.
///
/// Sibling calls within one scheduling turn for the same relation and
/// argument signature share one loader and one batch window. A parent
/// whose key field is null or absent short-circuits without enqueueing a
/// batch key.
pub async fn resolve_relation(
    ctx: &RequestContext,
    entity: &EntityMeta,
    relation_name: &str,
    parent: &JsonObject,
    node: &SelectionNode,
    args: QueryArgs,
) -> QueryResult<Value> {
    let relation = find_relation(entity, relation_name)?;
    let store = ctx.store()?;
    // The batched fetch has no single per-parent result; side effects
    // registered here have nothing to observe and are discarded.
    let mut effects = SideEffects::new();
    let args = ctx
        .pipeline()
        .apply(
            node,
            args,
            ctx.values(),
            &entity.name,
            &entity.collection,
            Operation::FindMany,
            &mut effects,
        )
        .await?;
    let base = count::merge_count(selection::count_selection(node), QueryDescriptor::from(args));
    let key = LoaderKey::for_query(relation.name.clone(), &base);
    let loader = ctx.loaders().get_or_create(key, || {
        RelationLoader::new(store, relation.clone(), base, ctx.loader_options().clone())
    });
    loader.load_for(parent).await
}

/// Resolve a relation field without batching: one `findUniqueOrThrow` on
/// the parent collection, selecting the relation with the caller's full
/// arguments nested inside.
///
/// The unique-parent filter is built from the entity's filter key; an
/// entity with no identifying field and no unique index fails before any
/// query is issued.
pub async fn resolve_relation_direct(
    ctx: &RequestContext,
    entity: &EntityMeta,
    relation_name: &str,
    parent: &JsonObject,
    node: &SelectionNode,
    args: QueryArgs,
) -> QueryResult<Value> {
    let relation = find_relation(entity, relation_name)?;
    let filter = meta::unique_filter(entity, parent)?;
    let store = ctx.store()?;

    let nested = count::merge_count(selection::count_selection(node), QueryDescriptor::from(args));
    let mut select = SelectMap::new();
    select.insert(relation.name.clone(), SelectField::Query(Box::new(nested)));

    let mut query = QueryDescriptor::new();
    query.filter = Some(filter);
    query.select = Some(select);

    debug!(entity = %entity.name, relation = %relation.name, "direct relation fetch");
    let result = store
        .execute(&entity.collection, Operation::FindUniqueOrThrow, query)
        .await?;
    let Value::Object(mut row) = result else {
        return Err(QueryError::unexpected_shape(format!(
            "findUniqueOrThrow on `{}` returned a non-object result",
            entity.collection
        )));
    };
    Ok(row.remove(relation.name.as_str()).unwrap_or_else(|| {
        if relation.is_list {
            Value::Array(Vec::new())
        } else {
            Value::Null
        }
    }))
}

fn find_relation<'a>(
    entity: &'a EntityMeta,
    relation_name: &str,
) -> QueryResult<&'a RelationMeta> {
    entity.find_relation(relation_name).ok_or_else(|| {
        QueryError::invalid_configuration(format!(
            "entity `{}` has no relation `{relation_name}`",
            entity.name
        ))
    })
}
