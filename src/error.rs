use std::sync::Arc;

use thiserror::Error;

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error type shared across the engine.
///
/// This is a single error enum covering operation-set contract violations, SQL template
/// compilation, data-source classification/loading, and query execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV/TSV parsing error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "parquet")]
    /// Parquet reading error (feature-gated behind `parquet`).
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// SQL compilation requires a `from.table`.
    #[error("missing from table")]
    MissingFromTable,

    /// SQL compilation rejects an explicitly empty column selection.
    #[error("at least one column must be selected")]
    EmptySelection,

    /// MSSQL/Oracle pagination needs a sortable column, so `select *` cannot be paginated.
    #[error("at least one column must be explicitly specified. Received '*'.")]
    ExplicitColumnsRequired,

    /// A filter entry carried no operands.
    #[error("Invalid operand length")]
    InvalidOperandLength,

    /// A filter entry's operand count does not fit its operation.
    #[error("Invalid filter operation")]
    InvalidFilterOperation,

    /// A referenced column does not exist in the row set.
    #[error("unknown column: {name}")]
    UnknownColumn { name: String },

    /// The requested type assertion is not a coercion target.
    #[error("unable to coerce to type: {type_name}")]
    UnableToCoerce { type_name: String },

    /// A derived-column formula failed for one row.
    #[error("derive error: {message}")]
    Derive { message: String },

    /// No data source was provided.
    #[error("missing data source")]
    MissingDataSource,

    /// The provided value cannot be used as a data source.
    #[error("invalid data source")]
    InvalidDataSource,

    /// A file attachment's MIME type is not supported for the requested mode.
    #[error("unsupported file type: {mime_type}")]
    UnsupportedFileType { mime_type: String },

    /// A mode needed the embedded database bridge but none is configured.
    #[error("no embedded database configured")]
    NoEmbeddedDatabase,

    /// The client exposes no execution capability.
    #[error("source does not implement query, queryStream, or sql")]
    UnsupportedClient,

    /// A load was requested for a source id that was never registered.
    #[error("unknown data source (id {id})")]
    UnknownSource { id: u64 },

    /// A value could not be converted while reading an external source.
    #[error("failed to read value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// A cached load failure, shared between all waiters of the same load.
    #[error("{0}")]
    Shared(Arc<EngineError>),
}

impl From<Arc<EngineError>> for EngineError {
    fn from(error: Arc<EngineError>) -> Self {
        EngineError::Shared(error)
    }
}

impl EngineError {
    /// Formats a derive failure from any displayable error.
    pub fn derive(message: impl std::fmt::Display) -> Self {
        EngineError::Derive {
            message: message.to_string(),
        }
    }
}
