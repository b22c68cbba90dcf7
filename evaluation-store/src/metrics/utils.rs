//! Thin wrappers over the `metrics` facade.
//!
//! Nothing here installs a recorder. Emission is a no-op until the embedding
//! service installs one (the `evaluation-store` binary does not).

use std::time::Instant;

pub fn inc(name: &'static str, labels: &[(String, String)], value: u64) {
    metrics::counter!(name, labels).increment(value);
}

pub fn histogram(name: &'static str, labels: &[(String, String)], value: f64) {
    metrics::histogram!(name, labels).record(value);
}

/// Records the time between creation and drop, in milliseconds.
pub struct TimingGuard<'a> {
    name: &'static str,
    labels: &'a [(String, String)],
    start: Instant,
}

pub fn timing_guard<'a>(name: &'static str, labels: &'a [(String, String)]) -> TimingGuard<'a> {
    TimingGuard {
        name,
        labels,
        start: Instant::now(),
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram(self.name, self.labels, elapsed_ms);
    }
}

pub fn operation_labels(operation: &str) -> Vec<(String, String)> {
    vec![("operation".to_string(), operation.to_string())]
}
