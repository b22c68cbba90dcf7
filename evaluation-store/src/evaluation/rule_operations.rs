use std::collections::{HashMap, HashSet};

use futures::Stream;
use sqlx::PgConnection;

use crate::errors::EvaluationStoreError;
use crate::evaluation::evaluation_models::{EvaluationRule, EvaluationRuleRow};
use crate::evaluation::row_stream::fold_rows;

/// Every rule of a flag joined to its segment and, when it has any, the
/// segment's constraints. One row per (rule, constraint) pair; a segment
/// without constraints yields a single row with NULL constraint columns.
pub const EVALUATION_RULES_QUERY: &str = r#"
    SELECT r.id,
           r.flag_key,
           r.segment_key,
           s.match_type AS segment_match_type,
           r.rank,
           c.id AS constraint_id,
           c.type AS constraint_type,
           c.property AS constraint_property,
           c.operator AS constraint_operator,
           c.value AS constraint_value
      FROM rules AS r
      JOIN segments AS s ON (r.segment_key = s.key)
      LEFT JOIN constraints AS c ON (s.key = c.segment_key)
     WHERE r.flag_key = $1
     GROUP BY r.id, c.id, s.match_type
     ORDER BY r.rank ASC
"#;

/// Rebuilds rules and their constraint lists from joined rows.
///
/// Rules keep the order their first row arrived in, and each rule's
/// constraints keep the order of that rule's rows. Ordering by rank is the
/// query's job; nothing here sorts.
#[derive(Debug, Default)]
pub struct RuleFlattener {
    rules: Vec<EvaluationRule>,
    positions: HashMap<String, usize>,
    seen_constraints: HashSet<(usize, String)>,
}

impl RuleFlattener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: EvaluationRuleRow) {
        let (rule, constraint) = row.into_parts();

        let index = match self.positions.get(&rule.id) {
            Some(&index) => index,
            None => {
                let index = self.rules.len();
                self.positions.insert(rule.id.clone(), index);
                self.rules.push(rule);
                index
            }
        };

        if let Some(constraint) = constraint {
            // a repeated (rule, constraint) row must not duplicate the entry
            if self.seen_constraints.insert((index, constraint.id.clone())) {
                self.rules[index].constraints.push(constraint);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rules.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn finish(self) -> Vec<EvaluationRule> {
        self.rules
    }
}

pub async fn flatten_rule_rows<S>(rows: S) -> Result<Vec<EvaluationRule>, EvaluationStoreError>
where
    S: Stream<Item = Result<EvaluationRuleRow, sqlx::Error>>,
{
    let flattener = fold_rows(rows, RuleFlattener::new(), RuleFlattener::push).await?;
    Ok(flattener.finish())
}

pub async fn fetch_evaluation_rules(
    conn: &mut PgConnection,
    flag_key: &str,
) -> Result<Vec<EvaluationRule>, EvaluationStoreError> {
    let rows = sqlx::query_as::<_, EvaluationRuleRow>(EVALUATION_RULES_QUERY)
        .bind(flag_key)
        .fetch(conn);

    flatten_rule_rows(rows).await
}
