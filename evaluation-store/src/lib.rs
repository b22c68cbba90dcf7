pub mod config;
pub mod context;
pub mod database;
pub mod errors;
pub mod evaluation;
pub mod metrics;

// Shared with the integration tests under tests/, so compiled unconditionally
pub mod utils;

pub use context::EvaluationContext;
pub use errors::EvaluationStoreError;
pub use evaluation::evaluation_models::{
    ComparisonType, EvaluationConstraint, EvaluationDistribution, EvaluationRule,
    SegmentMatchType,
};
pub use evaluation::evaluation_store::{EvaluationStore, PgEvaluationStore};
