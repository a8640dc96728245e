//! The request-scoped loader registry.
//!
//! Loader identity is structural: the relation name plus the normalized
//! argument signature of its base descriptor. Sibling nodes resolving the
//! same relation with the same arguments within one request share one
//! loader and therefore one batch window. The registry lives and dies
//! with its request context; sharing a loader across requests would leak
//! one caller's rows to another.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use smol_str::SmolStr;

use trellis_query::QueryDescriptor;

use crate::relation::RelationLoader;

/// Structural identity of one loader instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoaderKey {
    /// Relation field name.
    pub relation: SmolStr,
    /// Normalized argument signature of the loader's base descriptor.
    pub signature: SmolStr,
}

impl LoaderKey {
    /// Build a key from its parts.
    pub fn new(relation: impl Into<SmolStr>, signature: impl Into<SmolStr>) -> Self {
        Self {
            relation: relation.into(),
            signature: signature.into(),
        }
    }

    /// Build a key for a relation resolved with the given base descriptor.
    pub fn for_query(relation: impl Into<SmolStr>, base: &QueryDescriptor) -> Self {
        Self::new(relation, base.signature())
    }
}

/// Lazily-populated map of loader instances, owned by one request context.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: Mutex<HashMap<LoaderKey, Arc<RelationLoader>>>,
}

impl LoaderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the loader for `key`, creating it on first use.
    pub fn get_or_create(
        &self,
        key: LoaderKey,
        create: impl FnOnce() -> RelationLoader,
    ) -> Arc<RelationLoader> {
        self.loaders
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(create()))
            .clone()
    }

    /// Number of distinct loaders created so far.
    pub fn len(&self) -> usize {
        self.loaders.lock().len()
    }

    /// Whether no loader has been created yet.
    pub fn is_empty(&self) -> bool {
        self.loaders.lock().is_empty()
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("loaders", &self.len())
            .finish()
    }
}
