//! Error types for graph resolution
//!
//! Caller-input errors (bad filters, bad pagination arguments) and adapter-contract
//! violations share one enum so resolvers can propagate everything with `?`.

use thiserror::Error;

/// Central error type for all resolution operations.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The `filter` argument was present but was not an object of scalar entries
    #[error("Invalid filter: {0}, must be object.")]
    InvalidFilter(String),

    /// An operator suffix that the adapter vocabulary does not recognise
    #[error("Unsupported filter operator `{operator}` on field `{field}`")]
    UnsupportedOperator { field: String, operator: String },

    /// The operator is known but the value does not fit it
    #[error("Invalid value for filter `{field}__{operator}`: {reason}")]
    InvalidFilterValue {
        field: String,
        operator: String,
        reason: String,
    },

    /// Malformed pagination (or other declared) argument
    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument { argument: String, reason: String },

    /// No model resolver registered for a GraphQL type
    #[error("No resolver defined for type {0}")]
    UnknownType(String),

    /// A closed model resolver received a field it does not declare
    #[error("No resolver defined for field {field} on type {type_name}")]
    UnknownField { type_name: String, field: String },

    /// The adapter has no relation with this name on the table
    #[error("Unknown relation {relation} on table {table}")]
    UnknownRelation { table: String, relation: String },

    /// The adapter has no model registered for this table
    #[error("Unknown model {0}")]
    UnknownModel(String),

    /// GraphQL query text could not be turned into a selection tree
    #[error("Selection error: {0}")]
    Selection(String),

    /// `finish_query_pagination` ran before the subquery recorded its bookkeeping
    #[error("Pagination context for field {field} was never populated")]
    PaginationContextMissing { field: String },

    /// A pagination context was written twice or reused after being read
    #[error("Pagination context reused across relation invocations")]
    PaginationContextReused,

    /// SQL execution errors
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Result documents that could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ResolveError {
    /// Creates an invalid filter value error
    pub fn invalid_filter_value(
        field: impl Into<String>,
        operator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFilterValue {
            field: field.into(),
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid argument error
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown field error
    pub fn unknown_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// True for errors caused by the GraphQL caller rather than by the schema author
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilter(_)
                | Self::UnsupportedOperator { .. }
                | Self::InvalidFilterValue { .. }
                | Self::InvalidArgument { .. }
                | Self::Selection(_)
        )
    }
}

/// Type alias for Results that use ResolveError
pub type ResolveResult<T> = Result<T, ResolveError>;
