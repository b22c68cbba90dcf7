use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use common_database::PostgresReader;
use tracing::instrument;

use crate::config::Config;
use crate::context::EvaluationContext;
use crate::database::get_connection_with_metrics;
use crate::errors::EvaluationStoreError;
use crate::evaluation::distribution_operations::fetch_evaluation_distributions;
use crate::evaluation::evaluation_models::{EvaluationDistribution, EvaluationRule};
use crate::evaluation::rule_operations::fetch_evaluation_rules;
use crate::metrics::consts::{
    DB_DISTRIBUTION_READS_COUNTER, DB_EVALUATION_ERRORS_COUNTER, DB_RULE_READS_COUNTER,
    DISTRIBUTIONS_RETURNED_HISTOGRAM, RULES_RETURNED_HISTOGRAM,
};
use crate::metrics::utils::{histogram, inc, operation_labels};

const GET_EVALUATION_RULES: &str = "get_evaluation_rules";
const GET_EVALUATION_DISTRIBUTIONS: &str = "get_evaluation_distributions";

/// Read side consumed by the evaluation engine.
///
/// Every call re-runs its query and delivers all or nothing: an error is
/// never accompanied by a partial result.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Rules of `flag_key` in ascending rank, each with its segment's
    /// constraints.
    async fn get_evaluation_rules(
        &self,
        ctx: &EvaluationContext,
        flag_key: &str,
    ) -> Result<Vec<EvaluationRule>, EvaluationStoreError>;

    /// Distributions of `rule_id` with their variant keys resolved.
    async fn get_evaluation_distributions(
        &self,
        ctx: &EvaluationContext,
        rule_id: &str,
    ) -> Result<Vec<EvaluationDistribution>, EvaluationStoreError>;
}

/// Postgres-backed `EvaluationStore`.
#[derive(Clone)]
pub struct PgEvaluationStore {
    reader: PostgresReader,
    query_timeout: Duration,
}

const _: fn() = || {
    fn assert_evaluation_store<T: EvaluationStore + Clone + 'static>() {}
    assert_evaluation_store::<PgEvaluationStore>();
};

impl PgEvaluationStore {
    pub fn new(reader: PostgresReader, query_timeout: Duration) -> Self {
        Self {
            reader,
            query_timeout,
        }
    }

    pub fn from_config(reader: PostgresReader, config: &Config) -> Self {
        Self::new(reader, config.query_timeout())
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Runs `fut` under both the caller's context and the store's own
    /// query timeout.
    async fn run_bounded<F, T>(
        &self,
        ctx: &EvaluationContext,
        fut: F,
    ) -> Result<T, EvaluationStoreError>
    where
        F: Future<Output = Result<T, EvaluationStoreError>>,
    {
        ctx.run(async {
            match tokio::time::timeout(self.query_timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(EvaluationStoreError::Timeout(Some(
                    "client_timeout".to_string(),
                ))),
            }
        })
        .await
    }
}

#[async_trait]
impl EvaluationStore for PgEvaluationStore {
    #[instrument(skip_all, fields(flag_key = %flag_key))]
    async fn get_evaluation_rules(
        &self,
        ctx: &EvaluationContext,
        flag_key: &str,
    ) -> Result<Vec<EvaluationRule>, EvaluationStoreError> {
        tracing::debug!(flag_key, "get evaluation rules");
        let labels = operation_labels(GET_EVALUATION_RULES);

        let result = self
            .run_bounded(ctx, async {
                let mut conn =
                    get_connection_with_metrics(&self.reader, GET_EVALUATION_RULES).await?;
                fetch_evaluation_rules(&mut conn, flag_key).await
            })
            .await;

        inc(DB_RULE_READS_COUNTER, &labels, 1);
        match &result {
            Ok(rules) => {
                histogram(RULES_RETURNED_HISTOGRAM, &labels, rules.len() as f64);
                tracing::debug!(?rules, "get evaluation rules");
            }
            Err(e) => record_error(&labels, e),
        }

        result
    }

    #[instrument(skip_all, fields(rule_id = %rule_id))]
    async fn get_evaluation_distributions(
        &self,
        ctx: &EvaluationContext,
        rule_id: &str,
    ) -> Result<Vec<EvaluationDistribution>, EvaluationStoreError> {
        tracing::debug!(rule_id, "get evaluation distributions");
        let labels = operation_labels(GET_EVALUATION_DISTRIBUTIONS);

        let result = self
            .run_bounded(ctx, async {
                let mut conn =
                    get_connection_with_metrics(&self.reader, GET_EVALUATION_DISTRIBUTIONS)
                        .await?;
                fetch_evaluation_distributions(&mut conn, rule_id).await
            })
            .await;

        inc(DB_DISTRIBUTION_READS_COUNTER, &labels, 1);
        match &result {
            Ok(distributions) => {
                histogram(
                    DISTRIBUTIONS_RETURNED_HISTOGRAM,
                    &labels,
                    distributions.len() as f64,
                );
                tracing::debug!(?distributions, "get evaluation distributions");
            }
            Err(e) => record_error(&labels, e),
        }

        result
    }
}

fn record_error(labels: &[(String, String)], error: &EvaluationStoreError) {
    tracing::error!(error = %error, code = %error.error_code(), "evaluation store read failed");

    let mut labels = labels.to_vec();
    labels.push(("error".to_string(), error.error_code()));
    inc(DB_EVALUATION_ERRORS_COUNTER, &labels, 1);
}
