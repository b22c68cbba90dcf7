use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use async_trait::async_trait;
use common_database::{get_pool_with_timeouts, Client, CustomDatabaseError, PostgresReader};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::{pool::PoolConnection, postgres::PgPoolOptions, Error as SqlxError, PgPool, Postgres};
use uuid::Uuid;

use crate::config::{Config, DEFAULT_TEST_CONFIG};
use crate::evaluation::evaluation_models::{ComparisonType, SegmentMatchType};

pub const EVALUATION_SCHEMA: &str = include_str!("../../schema/evaluation.sql");

// Serializes concurrent schema setup across test processes
const SCHEMA_LOCK_KEY: i64 = 7_203_118_451;

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

/// Fails every connection attempt as if the pool had been shut down.
pub struct MockPgClient;

#[async_trait]
impl Client for MockPgClient {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
        Err(CustomDatabaseError::Other(SqlxError::PoolClosed))
    }
}

pub fn setup_invalid_pg_client() -> PostgresReader {
    Arc::new(MockPgClient)
}

/// Like `MockPgClient`, but counts how often a connection was requested.
#[derive(Default)]
pub struct CountingPgClient {
    attempts: AtomicUsize,
}

impl CountingPgClient {
    pub fn connection_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Client for CountingPgClient {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CustomDatabaseError::Other(SqlxError::PoolClosed))
    }
}

/// Hangs for `delay` before timing out, standing in for an exhausted pool.
pub struct SlowPgClient {
    delay: Duration,
}

#[async_trait]
impl Client for SlowPgClient {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
        tokio::time::sleep(self.delay).await;
        Err(CustomDatabaseError::Other(SqlxError::PoolTimedOut))
    }
}

pub fn setup_slow_pg_client(delay: Duration) -> PostgresReader {
    Arc::new(SlowPgClient { delay })
}

/// Postgres fixture: a writer pool for seeding rows and the read-only
/// reader pool the store runs against.
pub struct TestContext {
    writer: PgPool,
    pub reader: PostgresReader,
}

impl TestContext {
    pub async fn new(config: Option<&Config>) -> Self {
        let config = config.unwrap_or(&DEFAULT_TEST_CONFIG);

        let writer = PgPoolOptions::new()
            .max_connections(config.max_pg_connections)
            .connect(&config.database_url)
            .await
            .expect("Failed to create Postgres writer pool");

        let mut tx = writer.begin().await.expect("Failed to begin schema setup");
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .expect("Failed to take schema lock");
        sqlx::raw_sql(EVALUATION_SCHEMA)
            .execute(&mut *tx)
            .await
            .expect("Failed to apply evaluation schema");
        tx.commit().await.expect("Failed to commit schema setup");

        let reader = get_pool_with_timeouts(
            &config.database_url,
            config.max_pg_connections,
            config.database_timeouts(),
        )
        .await
        .expect("Failed to create Postgres reader pool");

        Self {
            writer,
            reader: Arc::new(reader),
        }
    }

    pub async fn insert_segment(
        &self,
        key: &str,
        match_type: SegmentMatchType,
    ) -> Result<(), Error> {
        sqlx::query("INSERT INTO segments (key, match_type) VALUES ($1, $2)")
            .bind(key)
            .bind(match_type)
            .execute(&self.writer)
            .await?;
        Ok(())
    }

    pub async fn insert_constraint(
        &self,
        segment_key: &str,
        constraint_type: ComparisonType,
        property: &str,
        operator: &str,
        value: &str,
    ) -> Result<String, Error> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"INSERT INTO constraints (id, segment_key, type, property, operator, value)
            VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(&id)
        .bind(segment_key)
        .bind(constraint_type)
        .bind(property)
        .bind(operator)
        .bind(value)
        .execute(&self.writer)
        .await?;
        Ok(id)
    }

    /// Seeds `count` string constraints on `segment_key` in a single
    /// statement, for reads large enough to stream for a while.
    pub async fn insert_constraints_bulk(
        &self,
        segment_key: &str,
        count: i32,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"INSERT INTO constraints (id, segment_key, type, property, operator, value)
            SELECT $1 || '-' || n, $2, $3, 'property-' || n, 'eq', n::text
            FROM generate_series(1, $4) AS n"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(segment_key)
        .bind(ComparisonType::String)
        .bind(count)
        .execute(&self.writer)
        .await?;
        Ok(())
    }

    pub async fn insert_rule(
        &self,
        flag_key: &str,
        segment_key: &str,
        rank: i32,
    ) -> Result<String, Error> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO rules (id, flag_key, segment_key, rank) VALUES ($1, $2, $3, $4)")
            .bind(&id)
            .bind(flag_key)
            .bind(segment_key)
            .bind(rank)
            .execute(&self.writer)
            .await?;
        Ok(id)
    }

    pub async fn insert_variant(&self, key: &str) -> Result<String, Error> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO variants (id, key) VALUES ($1, $2)")
            .bind(&id)
            .bind(key)
            .execute(&self.writer)
            .await?;
        Ok(id)
    }

    pub async fn insert_distribution(
        &self,
        rule_id: &str,
        variant_id: &str,
        rollout: f32,
    ) -> Result<String, Error> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO distributions (id, rule_id, variant_id, rollout) VALUES ($1, $2, $3, $4)",
        )
        .bind(&id)
        .bind(rule_id)
        .bind(variant_id)
        .bind(rollout)
        .execute(&self.writer)
        .await?;
        Ok(id)
    }

    /// Writes an arbitrary integer into a segment's match type, bypassing
    /// the enum, to simulate a corrupt row.
    pub async fn corrupt_segment_match_type(&self, key: &str, raw: i32) -> Result<(), Error> {
        sqlx::query("UPDATE segments SET match_type = $2 WHERE key = $1")
            .bind(key)
            .bind(raw)
            .execute(&self.writer)
            .await?;
        Ok(())
    }
}
