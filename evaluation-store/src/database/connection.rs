use common_database::{CustomDatabaseError, PostgresReader};
use sqlx::{pool::PoolConnection, Postgres};

use crate::metrics::consts::{ACQUIRE_TIMEOUT_COUNTER, DB_CONNECTION_TIME};
use crate::metrics::utils::{inc, timing_guard};

/// Acquires a reader connection, recording acquisition time to
/// `evaluation_db_connection_time` and pool timeouts to
/// `evaluation_acquire_timeout_total`.
///
/// # Example
/// ```ignore
/// let conn = get_connection_with_metrics(&reader, "get_evaluation_rules").await?;
/// ```
pub async fn get_connection_with_metrics(
    client: &PostgresReader,
    operation: &str,
) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
    let labels = vec![("operation".to_string(), operation.to_string())];
    let _conn_timer = timing_guard(DB_CONNECTION_TIME, &labels);

    let result = client.get_connection().await;

    if let Err(CustomDatabaseError::Other(sqlx::Error::PoolTimedOut)) = &result {
        inc(ACQUIRE_TIMEOUT_COUNTER, &labels, 1);
    }

    result
}
