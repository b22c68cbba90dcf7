pub mod distribution_operations;
pub mod evaluation_models;
pub mod evaluation_store;
pub mod row_stream;
pub mod rule_operations;
