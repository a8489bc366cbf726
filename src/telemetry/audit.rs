//! Session audit logs: every tracing event, shipped to the automation server.
//!
//! [`AuditLogLayer`] is a `tracing-subscriber` layer. For each event it takes
//! a snapshot (`[LEVEL] target: message`, plus the work item from the
//! [`LogContext`]) and hands it to a background task which POSTs it to
//! `/sessions/{session}/log`. Shipping is best effort: failures are reported
//! under [`SHIPPER_TARGET`] and never reach the code that emitted the event.
//! [`AuditShipper::shutdown`] drains the queue before the process exits.

use std::fmt::{self, Write as _};
use std::sync::{Arc, PoisonError, RwLock};

use opentelemetry::KeyValue;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use super::context::LogContext;
use super::metrics;
use crate::client::Client;
use crate::model::{SessionId, WorkItemId};

/// Target used for the shipper's own diagnostics. The layer never ships
/// events under it, so a failing log endpoint cannot feed itself.
pub const SHIPPER_TARGET: &str = "ats_client::audit";

/// Records waiting for the shipper. Beyond this, new records are dropped
/// and counted.
pub const AUDIT_QUEUE_CAPACITY: usize = 4096;

/// Crates on the shipping path. Their events would loop back into the layer.
const TRANSPORT_TARGETS: &[&str] = &["hyper", "h2", "reqwest", "rustls", "tower", "tonic"];

/// Sender slot shared by the layer and its [`AuditShipper`]. Emptying it
/// closes the channel.
type SharedSink = Arc<RwLock<Option<mpsc::Sender<LogRecord>>>>;

/// Body of `POST /sessions/{session}/log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub workitem_id: Option<WorkItemId>,
    pub message: String,
}

impl LogRecord {
    pub fn new(workitem_id: Option<WorkItemId>, level: &Level, target: &str, text: &str) -> Self {
        Self {
            workitem_id,
            message: format!("[{level}] {target}: {text}"),
        }
    }
}

/// Layer that snapshots events into [`LogRecord`]s.
pub struct AuditLogLayer {
    context: LogContext,
    sink: SharedSink,
}

impl AuditLogLayer {
    /// Layer feeding records into `sink`, whoever consumes it.
    pub fn new(context: LogContext, sink: mpsc::Sender<LogRecord>) -> Self {
        Self {
            context,
            sink: Arc::new(RwLock::new(Some(sink))),
        }
    }

    /// Layer that drops every record.
    pub fn disabled(context: LogContext) -> Self {
        Self {
            context,
            sink: Arc::new(RwLock::new(None)),
        }
    }

    /// Layer shipping to `session` through `client`, plus the handle that
    /// drains it.
    ///
    /// Without a session or a server URL the layer is disabled and no task is
    /// spawned. Otherwise this must be called from inside a tokio runtime.
    pub fn for_client(client: &Client, session: Option<SessionId>) -> (Self, Option<AuditShipper>) {
        let context = client.log_context().clone();
        let Some(session) = session.filter(|_| !client.base_url().is_empty()) else {
            return (Self::disabled(context), None);
        };

        let (tx, rx) = mpsc::channel(AUDIT_QUEUE_CAPACITY);
        let layer = Self::new(context, tx);
        let shipper = AuditShipper {
            sink: layer.sink.clone(),
            task: spawn_shipper(client.clone(), session, rx),
        };
        (layer, Some(shipper))
    }

    /// Does the layer still accept records?
    pub fn is_enabled(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<S> Layer<S> for AuditLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_excluded(meta.target()) {
            return;
        }
        let sink = self.sink.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = sink.as_ref() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let record = LogRecord::new(
            self.context.current(),
            meta.level(),
            meta.target(),
            &visitor.finish(),
        );

        if sink.try_send(record).is_err() {
            metrics::audit_records().add(1, &[KeyValue::new("result", "dropped")]);
        }
    }
}

/// Handle on the background task posting audit records.
///
/// The layer usually lives inside a global subscriber that is never dropped,
/// so the task only ends through [`AuditShipper::shutdown`]. Call it before
/// the runtime goes away, or queued records are lost.
#[derive(Debug)]
pub struct AuditShipper {
    sink: SharedSink,
    task: JoinHandle<()>,
}

impl AuditShipper {
    /// Stop accepting records, post everything already queued and wait for
    /// the last request to finish. Events emitted afterwards are dropped.
    pub async fn shutdown(self) {
        self.sink
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Err(e) = self.task.await {
            tracing::warn!(target: SHIPPER_TARGET, error = %e, "audit log shipper stopped abnormally");
        }
    }
}

fn is_excluded(target: &str) -> bool {
    target.starts_with(SHIPPER_TARGET)
        || TRANSPORT_TARGETS
            .iter()
            .any(|t| target == *t || target.starts_with(&format!("{t}::")))
}

/// Drain `rx`, posting each record in order. Ends once the sender is gone
/// and the queue is empty.
fn spawn_shipper(
    client: Client,
    session: SessionId,
    mut rx: mpsc::Receiver<LogRecord>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            match client.post_session_log(session, &record).await {
                Ok(()) => {
                    metrics::audit_records().add(1, &[KeyValue::new("result", "sent")]);
                }
                Err(e) => {
                    metrics::audit_records().add(1, &[KeyValue::new("result", "failed")]);
                    tracing::warn!(
                        target: SHIPPER_TARGET,
                        %session,
                        error = %e,
                        "failed to send log record"
                    );
                }
            }
        }
    })
}

/// Collects `message` plus any other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if name.starts_with("log.") {
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}
