//! The request context: the exclusive owner of everything request-scoped.
//!
//! One context exists per incoming query. It holds the store handle under
//! a named slot, a mutable key-value store for transforms, the loader
//! registry, and the argument pipeline. Dropping the context discards the
//! registry; a context (and its loaders) must never be reused across
//! requests.

use std::sync::Arc;

use smol_str::SmolStr;

use trellis_query::{ArgsPipeline, ArgsTransform, ContextValues, QueryError, QueryResult, Store};

use crate::batch::LoaderOptions;
use crate::registry::LoaderRegistry;

/// Default name of the context slot holding the store handle.
pub const DEFAULT_STORE_SLOT: &str = "store";

/// Request-scoped state for one incoming query.
pub struct RequestContext {
    store_slot: SmolStr,
    store: Option<Arc<dyn Store>>,
    values: ContextValues,
    loaders: LoaderRegistry,
    pipeline: ArgsPipeline,
    loader_options: LoaderOptions,
}

impl RequestContext {
    /// A context holding `store` under the default slot.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::builder().store(store).build()
    }

    /// Start building a context.
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// The store handle, or a configuration error naming the expected slot
    /// if it was never provided.
    pub fn store(&self) -> QueryResult<Arc<dyn Store>> {
        self.store
            .clone()
            .ok_or_else(|| QueryError::missing_store_handle(self.store_slot.clone()))
    }

    /// Name of the slot expected to hold the store handle.
    pub fn store_slot(&self) -> &str {
        &self.store_slot
    }

    /// The request-scoped key-value store.
    pub fn values(&self) -> &ContextValues {
        &self.values
    }

    /// The request-scoped loader registry.
    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    /// The argument pipeline.
    pub fn pipeline(&self) -> &ArgsPipeline {
        &self.pipeline
    }

    /// Replace the pipeline's transform; the last registration wins.
    pub fn set_transform(&self, transform: Arc<dyn ArgsTransform>) {
        self.pipeline.replace(transform);
    }

    /// Options applied to loaders created within this context.
    pub fn loader_options(&self) -> &LoaderOptions {
        &self.loader_options
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("store_slot", &self.store_slot)
            .field("has_store", &self.store.is_some())
            .field("loaders", &self.loaders)
            .finish()
    }
}

/// Builder for [`RequestContext`].
#[derive(Default)]
pub struct RequestContextBuilder {
    store_slot: Option<SmolStr>,
    store: Option<Arc<dyn Store>>,
    loader_options: LoaderOptions,
    transform: Option<Arc<dyn ArgsTransform>>,
}

impl RequestContextBuilder {
    /// Provide the store handle.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the name of the store slot.
    pub fn store_slot(mut self, slot: impl Into<SmolStr>) -> Self {
        self.store_slot = Some(slot.into());
        self
    }

    /// Options for loaders created within the context.
    pub fn loader_options(mut self, options: LoaderOptions) -> Self {
        self.loader_options = options;
        self
    }

    /// Register an argument transform.
    pub fn transform(mut self, transform: Arc<dyn ArgsTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Build the context.
    pub fn build(self) -> RequestContext {
        let pipeline = ArgsPipeline::new();
        if let Some(transform) = self.transform {
            pipeline.replace(transform);
        }
        RequestContext {
            store_slot: self
                .store_slot
                .unwrap_or_else(|| SmolStr::new_static(DEFAULT_STORE_SLOT)),
            store: self.store,
            values: ContextValues::new(),
            loaders: LoaderRegistry::new(),
            pipeline,
            loader_options: self.loader_options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use trellis_query::{Operation, QueryDescriptor};

    struct NullStore;

    #[async_trait]
    impl Store for NullStore {
        async fn execute(
            &self,
            _collection: &str,
            _operation: Operation,
            _query: QueryDescriptor,
        ) -> QueryResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_missing_store_names_slot() {
        let ctx = RequestContext::builder().store_slot("db").build();
        let err = ctx.store().err().unwrap();
        assert_eq!(err, QueryError::missing_store_handle("db"));
        assert!(err.to_string().contains("`db`"));
    }

    #[test]
    fn test_default_slot() {
        let ctx = RequestContext::builder().build();
        assert_eq!(ctx.store_slot(), DEFAULT_STORE_SLOT);
        assert!(ctx.store().is_err());
    }

    #[test]
    fn test_store_retrieval() {
        let ctx = RequestContext::new(Arc::new(NullStore));
        assert!(ctx.store().is_ok());
        assert!(ctx.loaders().is_empty());
    }
}
