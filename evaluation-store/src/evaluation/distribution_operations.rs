use futures::Stream;
use sqlx::PgConnection;

use crate::errors::EvaluationStoreError;
use crate::evaluation::evaluation_models::EvaluationDistribution;
use crate::evaluation::row_stream::fold_rows;

pub const EVALUATION_DISTRIBUTIONS_QUERY: &str = r#"
    SELECT d.id,
           d.rule_id,
           d.variant_id,
           d.rollout,
           v.key AS variant_key
      FROM distributions AS d
      JOIN variants AS v ON (d.variant_id = v.id)
     WHERE d.rule_id = $1
"#;

/// Collects distributions in row-arrival order. No ordering is imposed:
/// variant selection is weight-based.
pub async fn collect_distribution_rows<S>(
    rows: S,
) -> Result<Vec<EvaluationDistribution>, EvaluationStoreError>
where
    S: Stream<Item = Result<EvaluationDistribution, sqlx::Error>>,
{
    fold_rows(rows, Vec::new(), Vec::push).await
}

pub async fn fetch_evaluation_distributions(
    conn: &mut PgConnection,
    rule_id: &str,
) -> Result<Vec<EvaluationDistribution>, EvaluationStoreError> {
    let rows = sqlx::query_as::<_, EvaluationDistribution>(EVALUATION_DISTRIBUTIONS_QUERY)
        .bind(rule_id)
        .fetch(conn);

    collect_distribution_rows(rows).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn distribution(id: &str, variant_key: &str, rollout: f32) -> EvaluationDistribution {
        EvaluationDistribution {
            id: id.to_string(),
            rule_id: "r1".to_string(),
            variant_id: format!("variant-{variant_key}"),
            rollout,
            variant_key: variant_key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_distributions_map_one_to_one() {
        let rows = stream::iter(vec![
            Ok(distribution("d1", "on", 70.0)),
            Ok(distribution("d2", "off", 30.0)),
        ]);

        let distributions = collect_distribution_rows(rows).await.unwrap();

        assert_eq!(
            distributions,
            vec![distribution("d1", "on", 70.0), distribution("d2", "off", 30.0)]
        );
        let total: f32 = distributions.iter().map(|d| d.rollout).sum();
        assert_eq!(total, 100.0);
    }

    #[tokio::test]
    async fn test_rule_without_distributions() {
        let rows = stream::iter(Vec::<Result<EvaluationDistribution, sqlx::Error>>::new());
        assert!(collect_distribution_rows(rows).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_returns_no_distributions() {
        let rows = stream::iter(vec![
            Ok(distribution("d1", "on", 50.0)),
            Err(sqlx::Error::ColumnDecode {
                index: "\"rollout\"".to_string(),
                source: "mismatched types; Rust type `f32` is not compatible with SQL type `TEXT`"
                    .into(),
            }),
        ]);

        let result = collect_distribution_rows(rows).await;

        assert!(matches!(result, Err(EvaluationStoreError::Decode(_))));
    }

    #[tokio::test]
    async fn test_timeout_mid_stream_is_classified() {
        let rows = stream::iter(vec![
            Ok(distribution("d1", "on", 50.0)),
            Err(sqlx::Error::PoolTimedOut),
        ]);

        let result = collect_distribution_rows(rows).await;

        match result {
            Err(EvaluationStoreError::Timeout(Some(kind))) => assert_eq!(kind, "pool_timeout"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
