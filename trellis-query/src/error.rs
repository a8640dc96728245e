//! Error types for query planning and resolution.
//!
//! Errors carry an [`ErrorCode`] for programmatic handling. The enum is
//! `Clone` because a single failed batch dispatch is delivered to every
//! requester waiting on that batch.
//!
//! ```rust
//! use trellis_query::{QueryError, ErrorCode};
//!
//! let err = QueryError::missing_store_handle("store");
//! assert_eq!(err.code(), ErrorCode::MissingStoreHandle);
//! assert!(err.to_string().contains("store"));
//! ```

use smol_str::SmolStr;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Stable error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The request context has no store handle in its named slot (T1001).
    MissingStoreHandle = 1001,
    /// An entity has neither an identifying field nor a usable unique index (T1002).
    AmbiguousFilterKey = 1002,
    /// A batch window was torn down before its results were delivered (T2001).
    ///
    /// A store failure behind a dispatched batch carries no code of its
    /// own: it is re-thrown verbatim to every waiter as `StoreError`.
    BatchAbandoned = 2001,
    /// The store rejected a query (T3001).
    StoreError = 3001,
    /// The store returned a result shape the caller cannot use (T3002).
    UnexpectedResultShape = 3002,
    /// A resolver was configured against missing metadata (T4001).
    InvalidConfiguration = 4001,
}

impl ErrorCode {
    /// String representation of the code (e.g. `"T1001"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingStoreHandle => "T1001",
            Self::AmbiguousFilterKey => "T1002",
            Self::BatchAbandoned => "T2001",
            Self::StoreError => "T3001",
            Self::UnexpectedResultShape => "T3002",
            Self::InvalidConfiguration => "T4001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while planning or resolving a query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// The request context lacks the store-access handle.
    #[error(
        "unable to find a store handle in the request context; provide it under the `{slot}` slot"
    )]
    MissingStoreHandle {
        /// The context slot that was expected to hold the handle.
        slot: SmolStr,
    },

    /// The parent entity has no single identifying field and no composite
    /// unique index to build a unique filter from.
    #[error("entity `{entity}` has no identifying field and no usable unique index")]
    AmbiguousFilterKey {
        /// The entity whose filter key could not be resolved.
        entity: SmolStr,
    },

    /// A batch window was discarded before its store call resolved, leaving
    /// its waiters without results.
    #[error("batch window for relation `{relation}` was abandoned before dispatch completed")]
    BatchAbandoned {
        /// The relation whose batch was torn down.
        relation: SmolStr,
    },

    /// The store rejected a query.
    #[error("store error: {message}")]
    Store {
        /// Description from the store-access collaborator.
        message: String,
    },

    /// The store returned a shape the caller cannot interpret (e.g. a scalar
    /// where rows were expected).
    #[error("unexpected store result shape: {message}")]
    UnexpectedResultShape {
        /// What was expected and what arrived.
        message: String,
    },

    /// A resolver was invoked against metadata that does not describe the
    /// requested entity or relation.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the missing or inconsistent metadata.
        message: String,
    },
}

impl QueryError {
    /// The [`ErrorCode`] for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingStoreHandle { .. } => ErrorCode::MissingStoreHandle,
            Self::AmbiguousFilterKey { .. } => ErrorCode::AmbiguousFilterKey,
            Self::BatchAbandoned { .. } => ErrorCode::BatchAbandoned,
            Self::Store { .. } => ErrorCode::StoreError,
            Self::UnexpectedResultShape { .. } => ErrorCode::UnexpectedResultShape,
            Self::InvalidConfiguration { .. } => ErrorCode::InvalidConfiguration,
        }
    }

    /// Missing store handle under the given context slot.
    pub fn missing_store_handle(slot: impl Into<SmolStr>) -> Self {
        Self::MissingStoreHandle { slot: slot.into() }
    }

    /// Ambiguous filter key for the given entity.
    pub fn ambiguous_filter_key(entity: impl Into<SmolStr>) -> Self {
        Self::AmbiguousFilterKey {
            entity: entity.into(),
        }
    }

    /// Abandoned batch window for the given relation.
    pub fn batch_abandoned(relation: impl Into<SmolStr>) -> Self {
        Self::BatchAbandoned {
            relation: relation.into(),
        }
    }

    /// Store-level failure.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Unexpected result shape from the store.
    pub fn unexpected_shape(message: impl Into<String>) -> Self {
        Self::UnexpectedResultShape {
            message: message.into(),
        }
    }

    /// Configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}
