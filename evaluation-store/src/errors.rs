use common_database::{is_decode_error, timeout_type, CustomDatabaseError};
use thiserror::Error;

/// Failures surfaced by the evaluation store.
///
/// Nothing here is retried internally. Callers treat every variant as
/// "rules or distributions unavailable" and fall back on their own.
#[derive(Error, Debug)]
pub enum EvaluationStoreError {
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("query failed: {0}")]
    Query(sqlx::Error),
    #[error("failed to decode row: {0}")]
    Decode(sqlx::Error),
    #[error("row stream failed after {rows_read} rows: {source}")]
    Stream {
        rows_read: usize,
        #[source]
        source: sqlx::Error,
    },
    /// Timeout with an optional classification, see `common_database::timeout_type`.
    /// The store's own query deadline reports `client_timeout`.
    #[error("timed out while fetching data")]
    Timeout(Option<String>),
    #[error("request canceled")]
    Canceled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl EvaluationStoreError {
    /// Classifies a driver error raised while rows were being read.
    ///
    /// `rows_read` is the number of rows successfully decoded before the
    /// failure; a fault on an empty stream is a query failure.
    pub fn from_row_error(error: sqlx::Error, rows_read: usize) -> Self {
        if let Some(kind) = timeout_type(&error) {
            return EvaluationStoreError::Timeout(Some(kind.to_string()));
        }
        if is_decode_error(&error) {
            return EvaluationStoreError::Decode(error);
        }
        if rows_read == 0 {
            EvaluationStoreError::Query(error)
        } else {
            EvaluationStoreError::Stream {
                rows_read,
                source: error,
            }
        }
    }

    /// Stable code for metrics labels and log fields.
    pub fn error_code(&self) -> String {
        match self {
            EvaluationStoreError::DatabaseUnavailable => "database_unavailable".to_string(),
            EvaluationStoreError::Query(_) => "query_error".to_string(),
            EvaluationStoreError::Decode(_) => "decode_error".to_string(),
            EvaluationStoreError::Stream { .. } => "stream_error".to_string(),
            EvaluationStoreError::Timeout(None) => "timeout_error".to_string(),
            EvaluationStoreError::Timeout(Some(kind)) => format!("timeout:{kind}"),
            EvaluationStoreError::Canceled => "canceled".to_string(),
            EvaluationStoreError::DeadlineExceeded => "deadline_exceeded".to_string(),
        }
    }
}

impl From<CustomDatabaseError> for EvaluationStoreError {
    fn from(e: CustomDatabaseError) -> Self {
        match e {
            CustomDatabaseError::Other(sqlx::Error::PoolTimedOut) => {
                EvaluationStoreError::Timeout(Some("pool_timeout".to_string()))
            }
            CustomDatabaseError::Other(sqlx_error) => {
                tracing::error!("Failed to get database connection: {}", sqlx_error);
                EvaluationStoreError::DatabaseUnavailable
            }
            CustomDatabaseError::Timeout(_) => {
                EvaluationStoreError::Timeout(Some("client_timeout".to_string()))
            }
        }
    }
}
