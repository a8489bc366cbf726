//! Work item processing span helpers.

use tracing::Span;

use crate::model::WorkItem;

/// Start a span for one processing scope.
///
/// The `workitem.status` field is declared empty and filled in by
/// [`record_status_transition`].
pub fn start_workitem_span(item: &WorkItem) -> Span {
    tracing::info_span!(
        "workitem.process",
        "workitem.id" = %item.id,
        "workitem.reference" = %item.reference,
        "workitem.queue" = %item.workqueue_id,
        "workitem.status" = tracing::field::Empty,
    )
}

/// Record a status change on the span and emit it as a debug event.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.record("workitem.status", to);
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "status_transition");
    });
}
