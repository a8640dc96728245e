//! Batched loading of one relation for many parent rows.
//!
//! The loader intercepts "load related rows for parent key K" requests,
//! coalesces a window of them, and issues one `findMany` against the
//! related collection with the caller's original arguments plus a
//! foreign-key membership predicate over the collected keys. Results are
//! regrouped per parent: one-to-many relations map each parent to its
//! rows in store-return order, many-to-one relations to the first match;
//! unmatched parents resolve to an empty list or an absent value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use trellis_query::{
    JsonObject, QueryDescriptor, QueryError, QueryResult, RelationMeta, Store,
};

use crate::batch::{BatchFn, BatchLoader, LoaderOptions};
use crate::key::ParentKey;

/// The batch function behind a [`RelationLoader`]: one `findMany` per
/// window, regrouped by the target-side key column.
struct RelationBatch {
    store: Arc<dyn Store>,
    relation: RelationMeta,
    base: QueryDescriptor,
}

#[async_trait]
impl BatchFn<ParentKey, Value> for RelationBatch {
    async fn load(&self, keys: &[ParentKey]) -> QueryResult<HashMap<ParentKey, Value>> {
        let mut query = self.base.clone();
        let mut predicate = JsonObject::new();
        predicate.insert(
            "in".into(),
            Value::Array(keys.iter().map(ParentKey::to_json).collect()),
        );
        let mut membership = JsonObject::new();
        membership.insert(
            self.relation.target_field.to_string(),
            Value::Object(predicate),
        );
        query.merge_where(membership);

        let rows = self.store.find_many(&self.relation.collection, query).await?;
        debug!(
            relation = %self.relation.name,
            keys = keys.len(),
            rows = rows.len(),
            "batched relation fetch"
        );

        let mut grouped: HashMap<ParentKey, Value> = HashMap::new();
        for row in rows {
            let Some(key) = row
                .get(self.relation.target_field.as_str())
                .and_then(ParentKey::from_json)
            else {
                continue;
            };
            if self.relation.is_list {
                if let Value::Array(items) =
                    grouped.entry(key).or_insert_with(|| Value::Array(Vec::new()))
                {
                    items.push(Value::Object(row));
                }
            } else {
                grouped.entry(key).or_insert(Value::Object(row));
            }
        }
        Ok(grouped)
    }

    fn miss(&self, _key: &ParentKey) -> Value {
        if self.relation.is_list {
            Value::Array(Vec::new())
        } else {
            Value::Null
        }
    }
}

/// A request-scoped batching loader for one relation under one argument
/// signature.
pub struct RelationLoader {
    relation: RelationMeta,
    batch: BatchLoader<ParentKey, Value, RelationBatch>,
}

impl RelationLoader {
    /// Create a loader issuing `findMany` calls against `store` with the
    /// given base descriptor (the caller's transformed arguments plus any
    /// merged counts).
    pub fn new(
        store: Arc<dyn Store>,
        relation: RelationMeta,
        base: QueryDescriptor,
        options: LoaderOptions,
    ) -> Self {
        let batch = BatchLoader::new(
            relation.name.clone(),
            RelationBatch {
                store,
                relation: relation.clone(),
                base,
            },
            options,
        );
        Self { relation, batch }
    }

    /// The relation this loader serves.
    pub fn relation(&self) -> &RelationMeta {
        &self.relation
    }

    /// The empty result for this relation's shape: an empty list for list
    /// relations, an absent value for singular ones.
    pub fn empty(&self) -> Value {
        if self.relation.is_list {
            Value::Array(Vec::new())
        } else {
            Value::Null
        }
    }

    /// Load the related value for one parent key.
    pub async fn load(&self, key: ParentKey) -> QueryResult<Value> {
        self.batch.load(key).await
    }

    /// Load the related value for a parent row.
    ///
    /// A parent whose key field is absent or null short-circuits to the
    /// empty result without enqueueing a batch key; a null foreign key
    /// never matches any row.
    pub async fn load_for(&self, parent: &JsonObject) -> QueryResult<Value> {
        match parent.get(self.relation.parent_field.as_str()) {
            None | Some(Value::Null) => Ok(self.empty()),
            Some(value) => {
                let Some(key) = ParentKey::from_json(value) else {
                    return Err(QueryError::invalid_configuration(format!(
                        "relation `{}`: parent field `{}` holds a value that cannot key a batch",
                        self.relation.name, self.relation.parent_field
                    )));
                };
                self.batch.load(key).await
            }
        }
    }
}
