//! Prometheus metrics for bulk-upload-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bulk_upload_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for upload validations by outcome.
pub static UPLOAD_VALIDATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulk_upload_validations_total",
        "Total number of upload validation passes",
        &["status"]
    )
    .expect("Failed to register UPLOAD_VALIDATIONS")
});

/// Counter for rows processed by classification.
pub static ROWS_PROCESSED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulk_upload_rows_processed_total",
        "Total number of data rows processed during validation",
        &["classification"]
    )
    .expect("Failed to register ROWS_PROCESSED")
});

/// Counter for reconciliation operations.
pub static RECONCILE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulk_upload_reconcile_operations_total",
        "Total number of reconciliation write operations",
        &["operation", "status"]
    )
    .expect("Failed to register RECONCILE_OPERATIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bulk_upload_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&UPLOAD_VALIDATIONS);
    Lazy::force(&ROWS_PROCESSED);
    Lazy::force(&RECONCILE_OPERATIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record one validation pass.
pub fn record_validation(status: &str) {
    UPLOAD_VALIDATIONS.with_label_values(&[status]).inc();
}

/// Record a processed row by its classification.
pub fn record_row(classification: &str) {
    ROWS_PROCESSED.with_label_values(&[classification]).inc();
}

/// Record a reconciliation write.
pub fn record_reconcile_operation(operation: &str, status: &str) {
    RECONCILE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
