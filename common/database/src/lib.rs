use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::{
    pool::PoolConnection,
    postgres::{PgPool, PgPoolOptions},
    Error as SqlxError, Postgres,
};
use thiserror::Error;

// Evaluation reads only ever run short SELECTs, so the session limits are tight.
pub const DEFAULT_TIMEOUTS: DatabaseTimeouts = DatabaseTimeouts {
    statement_timeout: Duration::from_millis(300),
    lock_timeout: Duration::from_millis(100),
    acquire_timeout: Duration::from_millis(200),
    idle_timeout: Duration::from_secs(300),
    max_lifetime: Duration::from_secs(1800),
};

#[derive(Error, Debug)]
pub enum CustomDatabaseError {
    #[error("Pg error: {0}")]
    Other(#[from] sqlx::Error),

    #[error("Client timeout error")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

pub type PostgresReader = Arc<dyn Client + Send + Sync>;

/// Source of pooled Postgres connections.
///
/// Implemented for `PgPool`; tests swap in clients that fail on purpose.
#[async_trait]
pub trait Client {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError>;
}

#[derive(Debug, Clone)]
pub struct DatabaseTimeouts {
    pub statement_timeout: Duration,
    pub lock_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Builds a read-only pool. Every new session gets the statement and lock
/// timeouts applied and refuses writes.
pub async fn get_pool_with_timeouts(
    url: &str,
    max_connections: u32,
    timeouts: DatabaseTimeouts,
) -> Result<PgPool, sqlx::Error> {
    let stmt_ms = millis(timeouts.statement_timeout);
    let lock_ms = millis(timeouts.lock_timeout);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeouts.acquire_timeout)
        .test_before_acquire(true)
        .idle_timeout(timeouts.idle_timeout)
        .max_lifetime(timeouts.max_lifetime)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // SET does not accept bind parameters
                sqlx::query(&format!("SET statement_timeout = '{stmt_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;
                sqlx::query(&format!("SET lock_timeout = '{lock_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("SET default_transaction_read_only = on")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(url)
        .await
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl Client for PgPool {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
        let conn = self.acquire().await?;
        Ok(conn)
    }
}

/// Classifies a timeout-related failure, returning `None` for anything else.
///
/// The returned label is stable and safe to use as a metrics tag.
pub fn timeout_type(error: &SqlxError) -> Option<&'static str> {
    match error {
        SqlxError::PoolTimedOut => Some("pool_timeout"),
        SqlxError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => Some("io_timeout"),
        SqlxError::Protocol(msg) if msg.to_lowercase().contains("timeout") => {
            Some("protocol_timeout")
        }
        SqlxError::Database(db_error) => match db_error.code().as_deref() {
            // 57014: query_canceled, raised by statement_timeout
            Some("57014") => Some("query_canceled"),
            // 55P03: lock_not_available, raised by lock_timeout
            Some("55P03") => Some("lock_not_available"),
            Some(_) => None,
            None => {
                let msg = db_error.message().to_lowercase();
                if msg.contains("timeout") || msg.contains("canceling statement") {
                    Some("database_timeout")
                } else {
                    None
                }
            }
        },
        _ => None,
    }
}

/// True when the query ran but a row could not be turned into a Rust value.
pub fn is_decode_error(error: &SqlxError) -> bool {
    matches!(
        error,
        SqlxError::ColumnDecode { .. }
            | SqlxError::Decode(_)
            | SqlxError::ColumnNotFound(_)
            | SqlxError::ColumnIndexOutOfBounds { .. }
            | SqlxError::TypeNotFound { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt};

    #[derive(Debug)]
    struct MockDbError {
        msg: &'static str,
        code: Option<&'static str>,
    }

    impl fmt::Display for MockDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.msg)
        }
    }

    impl StdError for MockDbError {}

    impl DatabaseError for MockDbError {
        fn message(&self) -> &str {
            self.msg
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::from)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }
    }

    fn db_err(msg: &'static str, code: Option<&'static str>) -> SqlxError {
        SqlxError::from(MockDbError { msg, code })
    }

    #[test]
    fn test_timeout_type_pool_and_io() {
        assert_eq!(timeout_type(&SqlxError::PoolTimedOut), Some("pool_timeout"));

        let io_timeout = SqlxError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        ));
        assert_eq!(timeout_type(&io_timeout), Some("io_timeout"));

        let refused = SqlxError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(timeout_type(&refused), None);
    }

    #[test]
    fn test_timeout_type_sqlstate_codes() {
        assert_eq!(
            timeout_type(&db_err(
                "canceling statement due to statement timeout",
                Some("57014")
            )),
            Some("query_canceled")
        );
        assert_eq!(
            timeout_type(&db_err("lock not available", Some("55P03"))),
            Some("lock_not_available")
        );
        assert_eq!(
            timeout_type(&db_err("syntax error at or near", Some("42601"))),
            None
        );
    }

    #[test]
    fn test_timeout_type_message_fallback() {
        assert_eq!(
            timeout_type(&db_err("canceling statement due to timeout", None)),
            Some("database_timeout")
        );
        assert_eq!(timeout_type(&db_err("relation does not exist", None)), None);
    }

    #[test]
    fn test_timeout_type_protocol() {
        assert_eq!(
            timeout_type(&SqlxError::Protocol("operation timeout".to_string())),
            Some("protocol_timeout")
        );
        assert_eq!(
            timeout_type(&SqlxError::Protocol(
                "invalid protocol version".to_string()
            )),
            None
        );
    }

    #[test]
    fn test_is_decode_error() {
        let column_decode = SqlxError::ColumnDecode {
            index: "\"rank\"".to_string(),
            source: "mismatched types".into(),
        };
        assert!(is_decode_error(&column_decode));
        assert!(is_decode_error(&SqlxError::ColumnNotFound(
            "constraint_id".to_string()
        )));

        assert!(!is_decode_error(&SqlxError::PoolTimedOut));
        assert!(!is_decode_error(&SqlxError::RowNotFound));
        assert!(!is_decode_error(&db_err("relation does not exist", Some("42P01"))));
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(300)), 300);
        assert_eq!(millis(Duration::MAX), i64::MAX);
    }
}
