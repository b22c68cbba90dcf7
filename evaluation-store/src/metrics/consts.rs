// Storage reads
pub const DB_RULE_READS_COUNTER: &str = "evaluation_db_rule_reads_total";
pub const DB_DISTRIBUTION_READS_COUNTER: &str = "evaluation_db_distribution_reads_total";
pub const DB_EVALUATION_ERRORS_COUNTER: &str = "evaluation_db_errors_total";

// Connection pool
pub const DB_CONNECTION_TIME: &str = "evaluation_db_connection_time";
pub const ACQUIRE_TIMEOUT_COUNTER: &str = "evaluation_acquire_timeout_total";

// Result sizes
pub const RULES_RETURNED_HISTOGRAM: &str = "evaluation_rules_returned";
pub const DISTRIBUTIONS_RETURNED_HISTOGRAM: &str = "evaluation_distributions_returned";
