use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How a constraint's value is compared against request context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum ComparisonType {
    #[default]
    #[serde(rename = "UNKNOWN_COMPARISON_TYPE")]
    Unknown = 0,
    #[serde(rename = "STRING_COMPARISON_TYPE")]
    String = 1,
    #[serde(rename = "NUMBER_COMPARISON_TYPE")]
    Number = 2,
    #[serde(rename = "BOOLEAN_COMPARISON_TYPE")]
    Boolean = 3,
}

/// Whether every constraint of a segment must match, or any one of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum SegmentMatchType {
    #[default]
    #[serde(rename = "ALL_MATCH_TYPE")]
    All = 0,
    #[serde(rename = "ANY_MATCH_TYPE")]
    Any = 1,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConstraint {
    pub id: String,
    #[serde(rename = "type")]
    pub constraint_type: ComparisonType,
    pub property: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRule {
    pub id: String,
    pub flag_key: String,
    pub segment_key: String,
    pub segment_match_type: SegmentMatchType,
    pub rank: i32,
    #[serde(default)]
    pub constraints: Vec<EvaluationConstraint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EvaluationDistribution {
    pub id: String,
    pub rule_id: String,
    pub variant_id: String,
    pub rollout: f32,
    pub variant_key: String,
}

/// Constraint columns as they come out of the LEFT JOIN. Every column is
/// nullable because a segment without constraints still yields one row.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct OptionalConstraintRow {
    pub constraint_id: Option<String>,
    pub constraint_type: Option<ComparisonType>,
    pub constraint_property: Option<String>,
    pub constraint_operator: Option<String>,
    pub constraint_value: Option<String>,
}

impl OptionalConstraintRow {
    /// A constraint is present iff its id is. Missing sibling columns on a
    /// present constraint fall back to their empty value.
    pub fn into_constraint(self) -> Option<EvaluationConstraint> {
        let id = self.constraint_id?;
        Some(EvaluationConstraint {
            id,
            constraint_type: self.constraint_type.unwrap_or_default(),
            property: self.constraint_property.unwrap_or_default(),
            operator: self.constraint_operator.unwrap_or_default(),
            value: self.constraint_value.unwrap_or_default(),
        })
    }
}

/// One row of the rule, segment and constraint join.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EvaluationRuleRow {
    pub id: String,
    pub flag_key: String,
    pub segment_key: String,
    pub segment_match_type: SegmentMatchType,
    pub rank: i32,
    #[sqlx(flatten)]
    pub constraint: OptionalConstraintRow,
}

impl EvaluationRuleRow {
    /// Splits the row into a rule with no constraints and the row's
    /// optional constraint.
    pub fn into_parts(self) -> (EvaluationRule, Option<EvaluationConstraint>) {
        let rule = EvaluationRule {
            id: self.id,
            flag_key: self.flag_key,
            segment_key: self.segment_key,
            segment_match_type: self.segment_match_type,
            rank: self.rank,
            constraints: Vec::new(),
        };
        (rule, self.constraint.into_constraint())
    }
}
