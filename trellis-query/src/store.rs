//! The store-access seam.
//!
//! The core never talks to a database directly: it hands a
//! [`QueryDescriptor`] to a [`Store`] implementation, one callable per
//! `(collection, operation)` pair with a uniform argument contract. The
//! result is operation-shaped JSON: a single row, an array of rows, or an
//! aggregate structure.

use async_trait::async_trait;
use serde_json::Value;

use crate::descriptor::{JsonObject, QueryDescriptor};
use crate::error::{QueryError, QueryResult};
use crate::operations::Operation;

/// A handle to the backing data store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Execute one operation against a collection.
    async fn execute(
        &self,
        collection: &str,
        operation: Operation,
        query: QueryDescriptor,
    ) -> QueryResult<Value>;

    /// Execute a `findMany` and return the rows.
    async fn find_many(
        &self,
        collection: &str,
        query: QueryDescriptor,
    ) -> QueryResult<Vec<JsonObject>> {
        let result = self.execute(collection, Operation::FindMany, query).await?;
        let Value::Array(items) = result else {
            return Err(QueryError::unexpected_shape(format!(
                "findMany on `{collection}` returned a non-array result"
            )));
        };
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Object(row) => rows.push(row),
                other => {
                    return Err(QueryError::unexpected_shape(format!(
                        "findMany on `{collection}` returned a non-object row: {other}"
                    )));
                }
            }
        }
        Ok(rows)
    }
}
