//! Lead pipeline span helpers.

use tracing::Span;

/// Start a span for one processing attempt of a lead.
///
/// `lead.status` is declared empty and filled in by [`record_status`].
pub fn start_lead_span(external_id: &str, attempt: u32) -> Span {
    tracing::info_span!(
        "lead.process",
        "lead.external_id" = external_id,
        "lead.attempt" = attempt,
        "lead.agent" = tracing::field::Empty,
        "lead.status" = tracing::field::Empty,
    )
}

/// Record the agent chosen for this attempt.
pub fn record_agent(span: &Span, agent: &str) {
    span.record("lead.agent", agent);
}

/// Record the status the attempt ended in, and emit an event for it.
pub fn record_status(span: &Span, from: &str, to: &str) {
    span.record("lead.status", to);
    span.in_scope(|| {
        tracing::info!(from, to, "status_transition");
    });
}
