use thiserror::Error;

/// Failures reported by an aggregate query backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("unknown table {table}")]
    UnknownTable { table: String },

    #[error("unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("backend failure: {reason}")]
    Backend { reason: String },

    #[error("dataset error: {reason}")]
    Dataset { reason: String },
}

/// Failures of a summary build.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SummaryError {
    #[error("invalid dimensions: {reason}")]
    InvalidDimension { reason: String },

    #[error("aggregate query on {table} ({query}) failed: {source}")]
    AggregateQuery {
        table: String,
        query: String,
        #[source]
        source: GatewayError,
    },
}

impl SummaryError {
    pub fn invalid_dimension(reason: impl Into<String>) -> Self {
        SummaryError::InvalidDimension {
            reason: reason.into(),
        }
    }

    pub fn aggregate_query(
        table: impl Into<String>,
        query: impl Into<String>,
        source: GatewayError,
    ) -> Self {
        SummaryError::AggregateQuery {
            table: table.into(),
            query: query.into(),
            source,
        }
    }

    pub fn is_invalid_dimension(&self) -> bool {
        matches!(self, SummaryError::InvalidDimension { .. })
    }

    pub fn is_aggregate_query(&self) -> bool {
        matches!(self, SummaryError::AggregateQuery { .. })
    }
}

pub type SummaryResult<T> = Result<T, SummaryError>;
