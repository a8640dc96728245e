//! Store operation kinds and their wire names.

use std::fmt;

/// An operation supported by the store-access collaborator.
///
/// Every operation accepts a [`QueryDescriptor`](crate::QueryDescriptor)
/// and follows the same argument-merging contract; the result shape is
/// operation-specific (single row, array of rows, or an aggregate
/// structure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Find a single record by a unique filter.
    FindUnique,
    /// Find a single record by a unique filter, failing if absent.
    FindUniqueOrThrow,
    /// Find the first record matching a filter.
    FindFirst,
    /// Find the first record matching a filter, failing if absent.
    FindFirstOrThrow,
    /// Find all records matching a filter.
    FindMany,
    /// Create a record.
    Create,
    /// Update a record.
    Update,
    /// Create or update a record.
    Upsert,
    /// Delete a record.
    Delete,
    /// Compute aggregates over matching records.
    Aggregate,
    /// Group matching records and compute per-group aggregates.
    GroupBy,
    /// Count matching records.
    Count,
}

impl Operation {
    /// The operation name on the store-access wire (e.g. `"findMany"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FindUnique => "findUnique",
            Self::FindUniqueOrThrow => "findUniqueOrThrow",
            Self::FindFirst => "findFirst",
            Self::FindFirstOrThrow => "findFirstOrThrow",
            Self::FindMany => "findMany",
            Self::Create => "create",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Aggregate => "aggregate",
            Self::GroupBy => "groupBy",
            Self::Count => "count",
        }
    }

    /// Whether this operation compiles the selection tree into a field-exact
    /// `select` descriptor. Only the read operations do; writes and
    /// aggregates fold the selection in other ways.
    pub fn is_select_optimized(&self) -> bool {
        matches!(
            self,
            Self::FindUnique
                | Self::FindUniqueOrThrow
                | Self::FindFirst
                | Self::FindFirstOrThrow
                | Self::FindMany
        )
    }

    /// Whether this operation mutates the store.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Upsert | Self::Delete)
    }

    /// Whether this operation returns an aggregate structure instead of rows.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate | Self::GroupBy | Self::Count)
    }

    /// Whether this operation returns at most one row.
    pub fn is_singular(&self) -> bool {
        matches!(
            self,
            Self::FindUnique
                | Self::FindUniqueOrThrow
                | Self::FindFirst
                | Self::FindFirstOrThrow
                | Self::Create
                | Self::Update
                | Self::Upsert
                | Self::Delete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
