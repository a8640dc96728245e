//! The argument pipeline: a replaceable transform applied to caller
//! arguments before they reach the store.
//!
//! The pipeline is the system's sole customization point for cross-cutting
//! argument rewriting (e.g. injecting tenant scoping into every `where`
//! clause). It is an explicit, injectable strategy owned by the request
//! context; replacing it follows "last registration wins" semantics.
//!
//! A transform may also append to the [`SideEffects`] sink: ordered async
//! callbacks that receive the eventual store result and run, in append
//! order, after the store call completes and before the result is returned
//! to the caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use smol_str::SmolStr;

use crate::descriptor::QueryArgs;
use crate::error::QueryResult;
use crate::operations::Operation;
use crate::selection::SelectionNode;

/// A mutable, request-scoped key-value store exposed to transforms.
#[derive(Debug, Default)]
pub struct ContextValues {
    values: RwLock<HashMap<SmolStr, Value>>,
}

impl ContextValues {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Set a value, replacing any previous one.
    pub fn set(&self, key: impl Into<SmolStr>, value: Value) {
        self.values.write().insert(key.into(), value);
    }

    /// Remove a value, returning it if present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }
}

/// One registered post-query callback.
pub type SideEffect = Box<dyn FnOnce(Value) -> BoxFuture<'static, QueryResult<()>> + Send>;

/// An ordered, mutable list of callbacks to run against the query result.
#[derive(Default)]
pub struct SideEffects {
    callbacks: Vec<SideEffect>,
}

impl SideEffects {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback; callbacks run in append order, each receiving
    /// its own copy of the store result.
    pub fn push<F, Fut>(&mut self, effect: F)
    where
        F: FnOnce(Value) -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<()>> + Send + 'static,
    {
        self.callbacks.push(Box::new(move |result| Box::pin(effect(result))));
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run every callback against the store result, in registration order.
    pub async fn run(self, result: &Value) -> QueryResult<()> {
        for callback in self.callbacks {
            callback(result.clone()).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SideEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffects")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// A transform applied to caller arguments before the store call.
#[async_trait]
pub trait ArgsTransform: Send + Sync {
    /// Rewrite the caller's arguments for the given resolution.
    ///
    /// `effects` may be appended to; each callback receives the eventual
    /// store result once the call completes.
    async fn transform(
        &self,
        selection: &SelectionNode,
        args: QueryArgs,
        values: &ContextValues,
        entity: &str,
        collection: &str,
        operation: Operation,
        effects: &mut SideEffects,
    ) -> QueryResult<QueryArgs>;
}

/// The default transform: returns the arguments unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

#[async_trait]
impl ArgsTransform for IdentityTransform {
    async fn transform(
        &self,
        _selection: &SelectionNode,
        args: QueryArgs,
        _values: &ContextValues,
        _entity: &str,
        _collection: &str,
        _operation: Operation,
        _effects: &mut SideEffects,
    ) -> QueryResult<QueryArgs> {
        Ok(args)
    }
}

/// The injectable argument pipeline.
///
/// Holds the current [`ArgsTransform`]; [`replace`](Self::replace) swaps it
/// with last-registration-wins semantics.
pub struct ArgsPipeline {
    transform: RwLock<Arc<dyn ArgsTransform>>,
}

impl ArgsPipeline {
    /// A pipeline with the identity transform.
    pub fn new() -> Self {
        Self {
            transform: RwLock::new(Arc::new(IdentityTransform)),
        }
    }

    /// Replace the current transform. The last registration wins.
    pub fn replace(&self, transform: Arc<dyn ArgsTransform>) {
        *self.transform.write() = transform;
    }

    /// The currently registered transform.
    pub fn current(&self) -> Arc<dyn ArgsTransform> {
        self.transform.read().clone()
    }

    /// Apply the current transform.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply(
        &self,
        selection: &SelectionNode,
        args: QueryArgs,
        values: &ContextValues,
        entity: &str,
        collection: &str,
        operation: Operation,
        effects: &mut SideEffects,
    ) -> QueryResult<QueryArgs> {
        self.current()
            .transform(selection, args, values, entity, collection, operation, effects)
            .await
    }
}

impl Default for ArgsPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ArgsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgsPipeline").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::JsonObject;
    use parking_lot::Mutex;
    use serde_json::json;

    struct TenantTransform;

    #[async_trait]
    impl ArgsTransform for TenantTransform {
        async fn transform(
            &self,
            _selection: &SelectionNode,
            mut args: QueryArgs,
            values: &ContextValues,
            _entity: &str,
            _collection: &str,
            _operation: Operation,
            _effects: &mut SideEffects,
        ) -> QueryResult<QueryArgs> {
            if let Some(tenant) = values.get("tenant") {
                args.filter
                    .get_or_insert_with(JsonObject::new)
                    .insert("tenantId".into(), tenant);
            }
            Ok(args)
        }
    }

    #[tokio::test]
    async fn test_identity_is_default() {
        let pipeline = ArgsPipeline::new();
        let values = ContextValues::new();
        let mut effects = SideEffects::new();
        let args = QueryArgs::new().take(7);

        let out = pipeline
            .apply(
                &SelectionNode::default(),
                args.clone(),
                &values,
                "User",
                "user",
                Operation::FindMany,
                &mut effects,
            )
            .await
            .unwrap();
        assert_eq!(out, args);
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn test_replace_wins() {
        let pipeline = ArgsPipeline::new();
        pipeline.replace(Arc::new(TenantTransform));

        let values = ContextValues::new();
        values.set("tenant", json!("acme"));
        let mut effects = SideEffects::new();

        let out = pipeline
            .apply(
                &SelectionNode::default(),
                QueryArgs::new(),
                &values,
                "User",
                "user",
                Operation::FindMany,
                &mut effects,
            )
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({ "where": { "tenantId": "acme" } })
        );
    }

    #[tokio::test]
    async fn test_side_effects_run_in_append_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut effects = SideEffects::new();
        for label in ["first", "second", "third"] {
            let seen = seen.clone();
            effects.push(move |_result| async move {
                seen.lock().push(label);
                Ok(())
            });
        }

        effects.run(&json!(null)).await.unwrap();
        assert_eq!(*seen.lock(), ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_side_effect_sees_result() {
        let captured = Arc::new(Mutex::new(None));
        let mut effects = SideEffects::new();
        let slot = captured.clone();
        effects.push(move |result| async move {
            *slot.lock() = Some(result);
            Ok(())
        });

        effects.run(&json!({ "id": 1 })).await.unwrap();
        assert_eq!(*captured.lock(), Some(json!({ "id": 1 })));
    }
}
