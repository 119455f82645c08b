//! Metrics collection for store operations

use metrics::{counter, histogram, Unit};
use std::time::Duration;
use tracing::{debug, warn};

/// Metrics collector for store operations
#[derive(Debug, Clone)]
pub struct StoreMetrics {
    prefix: String,
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new("ipam_store")
    }
}

impl StoreMetrics {
    /// Create a new metrics collector with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Record query execution
    pub fn query_executed(&self, operation: &'static str, duration: Duration, success: bool) {
        let kind = classify_operation(operation);

        counter!(
            format!("{}_queries_total", self.prefix),
            "operation" => operation,
            "kind" => kind,
            "success" => success.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_query_duration_seconds", self.prefix),
            "operation" => operation
        )
        .record(duration.as_secs_f64());

        if success {
            debug!(operation, ?duration, "Query executed");
        } else {
            warn!(operation, ?duration, "Query failed");
        }
    }

    /// Record one address batch write
    pub fn batch_written(&self, attempted: usize, inserted: u64) {
        counter!(format!("{}_batch_writes_total", self.prefix)).increment(1);
        counter!(format!("{}_addresses_attempted_total", self.prefix)).increment(attempted as u64);
        counter!(format!("{}_addresses_inserted_total", self.prefix)).increment(inserted);

        // Rows already present collapse into no-ops
        let skipped = (attempted as u64).saturating_sub(inserted);
        if skipped > 0 {
            counter!(format!("{}_addresses_skipped_total", self.prefix)).increment(skipped);
        }
    }

    /// Record row counts for queries
    pub fn query_rows_returned(&self, row_count: usize) {
        histogram!(format!("{}_query_rows_returned", self.prefix)).record(row_count as f64);
    }

    /// Register metric descriptions with the installed recorder
    pub fn describe(&self) {
        metrics::describe_counter!(
            format!("{}_queries_total", self.prefix),
            "Store queries executed"
        );
        metrics::describe_histogram!(
            format!("{}_query_duration_seconds", self.prefix),
            Unit::Seconds,
            "Store query latency"
        );
        metrics::describe_counter!(
            format!("{}_addresses_inserted_total", self.prefix),
            "Pool addresses newly inserted"
        );
    }
}

/// Classify an operation name for metrics labeling
fn classify_operation(operation: &str) -> &'static str {
    match operation.split('_').next().unwrap_or_default() {
        "select" | "get" | "list" | "count" | "find" => "select",
        "insert" | "append" => "insert",
        "update" | "upsert" | "record" | "set" => "update",
        "delete" => "delete",
        "create" => "create",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_classification() {
        assert_eq!(classify_operation("get_subnet"), "select");
        assert_eq!(classify_operation("count_addresses"), "select");
        assert_eq!(classify_operation("insert_addresses"), "insert");
        assert_eq!(classify_operation("append_audit"), "insert");
        assert_eq!(classify_operation("upsert_device"), "update");
        assert_eq!(classify_operation("record_generation"), "update");
        assert_eq!(classify_operation("delete_addresses"), "delete");
        assert_eq!(classify_operation("create_schema"), "create");
        assert_eq!(classify_operation("vacuum"), "other");
    }

    #[test]
    fn test_recording_without_recorder() {
        let metrics = StoreMetrics::default();
        metrics.query_executed("get_subnet", Duration::from_millis(3), true);
        metrics.batch_written(500, 480);
        metrics.query_rows_returned(12);
    }
}
