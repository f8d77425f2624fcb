//! Metric instrument factories for leadflow.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("leadflow")
}

/// Counter: enqueue calls.
/// Labels: `result` ("created" | "existing").
pub fn leads_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("leadflow.leads.enqueued")
        .with_description("Number of enqueue calls")
        .build()
}

/// Counter: lead status transitions.
/// Labels: `from`, `to`.
pub fn lead_transitions() -> Counter<u64> {
    meter()
        .u64_counter("leadflow.leads.transitions")
        .with_description("Number of lead status transitions")
        .build()
}

/// Counter: round-robin assignments.
/// Labels: `agent`.
pub fn assignments() -> Counter<u64> {
    meter()
        .u64_counter("leadflow.assignments")
        .with_description("Number of leads assigned per agent")
        .build()
}

/// Counter: best-effort side effects (notifications, spreadsheet rows).
/// Labels: `target` ("primary" | "agent" | "sheet"), `result` ("ok" | "error").
pub fn deliveries() -> Counter<u64> {
    meter()
        .u64_counter("leadflow.deliveries")
        .with_description("Number of notification and spreadsheet deliveries")
        .build()
}

/// Counter: reconciler per-lead outcomes.
/// Labels: `outcome` ("synced" | "already_in_sheets" | "failed").
pub fn reconcile_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("leadflow.sync.outcomes")
        .with_description("Number of leads examined by the sync reconciler")
        .build()
}

/// Histogram: time spent on one lead's pipeline run.
/// Labels: `status` (final lead status).
pub fn pipeline_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("leadflow.pipeline.duration_ms")
        .with_description("Lead pipeline duration in milliseconds")
        .with_unit("ms")
        .build()
}
