//! Metric instrument factories for ats-client.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"ats-client"` meter; without
//! an exporter configured they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for ats-client instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("ats-client")
}

/// Counter: queue-level operations (next_item, add, clear).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("ats.queue.operations")
        .with_description("Number of work queue operations")
        .build()
}

/// Counter: work item status changes pushed to the server.
/// Labels: `to`.
pub fn status_transitions() -> Counter<u64> {
    meter()
        .u64_counter("ats.workitem.status_transitions")
        .with_description("Number of work item status transitions")
        .build()
}

/// Counter: audit log records.
/// Labels: `result` ("sent" | "failed" | "dropped").
pub fn audit_records() -> Counter<u64> {
    meter()
        .u64_counter("ats.audit.records")
        .with_description("Number of audit log records handled")
        .build()
}

/// Histogram: time spent inside a processing scope, in milliseconds.
/// Labels: `status`.
pub fn processing_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("ats.workitem.processing_duration_ms")
        .with_description("Work item processing duration in milliseconds")
        .with_unit("ms")
        .build()
}
