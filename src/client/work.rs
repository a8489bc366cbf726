//! Work item operations: data updates, status transitions and the
//! processing scope.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use futures::FutureExt as _;
use opentelemetry::KeyValue;
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{Instrument, Span, debug, error, warn};

use super::Client;
use crate::error::{Error, ProcessError, Result};
use crate::model::work::merge_data;
use crate::model::{Status, WorkItem};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_status_transition, start_workitem_span};

/// Message used when a scope ends without the consumer setting a status.
pub const DEFAULT_COMPLETE_MESSAGE: &str = "Completed";

#[derive(Serialize)]
struct UpdateRequest<'a> {
    data: &'a Map<String, Value>,
    reference: &'a str,
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    status: Status,
    message: &'a str,
}

/// Refuse any change to an item that already reached a terminal status.
fn ensure_not_terminal(item: &WorkItem, action: impl FnOnce() -> String) -> Result<()> {
    if item.status.is_terminal() {
        Err(Error::TerminalState {
            id: item.id,
            status: item.status,
            action: action(),
        })
    } else {
        Ok(())
    }
}

impl Client {
    /// Merge `partial` into the item's data and push the result.
    ///
    /// The local copy only changes once the server accepted the update.
    pub async fn update(&self, item: &mut WorkItem, partial: Map<String, Value>) -> Result<()> {
        ensure_not_terminal(item, || "update its data".to_string())?;

        let merged = merge_data(&item.data, partial);
        let path = format!("/workitems/{}", item.id);
        let body = UpdateRequest {
            data: &merged,
            reference: &item.reference,
        };
        self.send(self.request(Method::PUT, &path).json(&body)).await?;

        item.data = merged;
        debug!(item = %item.id, "updated work item data");
        Ok(())
    }

    /// Move the item to `status` with an outcome `message`.
    ///
    /// Fails with [`Error::InvalidStatus`] for `Pending` and with
    /// [`Error::TerminalState`] when the item is already completed or failed.
    pub async fn transition(
        &self,
        item: &mut WorkItem,
        status: Status,
        message: impl Into<String>,
    ) -> Result<()> {
        if !status.is_transition_target() {
            return Err(Error::InvalidStatus(status));
        }
        ensure_not_terminal(item, || format!("move it to {status}"))?;
        self.push_status(item, status, message.into()).await
    }

    pub async fn complete(&self, item: &mut WorkItem, message: impl Into<String>) -> Result<()> {
        self.transition(item, Status::Completed, message).await
    }

    pub async fn fail(&self, item: &mut WorkItem, message: impl Into<String>) -> Result<()> {
        self.transition(item, Status::Failed, message).await
    }

    /// Park the item until a person resumes it.
    pub async fn mark_pending_user(
        &self,
        item: &mut WorkItem,
        message: impl Into<String>,
    ) -> Result<()> {
        self.transition(item, Status::PendingUser, message).await
    }

    /// Unchecked status push. Local state follows only on success.
    async fn push_status(&self, item: &mut WorkItem, status: Status, message: String) -> Result<()> {
        let path = format!("/workitems/{}/status", item.id);
        let body = StatusRequest {
            status,
            message: &message,
        };
        self.send(self.request(Method::PUT, &path).json(&body)).await?;

        let from = item.status;
        item.status = status;
        item.message = message;

        record_status_transition(&Span::current(), from.as_str(), status.as_str());
        metrics::status_transitions().add(1, &[KeyValue::new("to", status.as_str())]);
        Ok(())
    }

    /// Process `item` inside a scope that reports the outcome to the server.
    ///
    /// - On entry the item is moved to `InProgress` if it is not already, and
    ///   becomes the [`LogContext`](crate::telemetry::LogContext)'s current
    ///   item.
    /// - If `f` returns `Err`, the item is marked `Failed` with the error's
    ///   text, even if `f` already set another status, and the error is
    ///   returned as [`ProcessError::Task`].
    /// - If `f` returns `Ok` and left the item `InProgress`, it is completed
    ///   with [`DEFAULT_COMPLETE_MESSAGE`]. Any other status is left alone.
    /// - If `f` panics, the item is marked `Failed` with the panic message and
    ///   the panic then continues.
    /// - The log context is cleared however the scope ends, including a
    ///   panic in `f` or the returned future being dropped. A dropped future
    ///   leaves the item's server status as it was.
    ///
    /// ```no_run
    /// # async fn run(client: ats_client::client::Client, mut item: ats_client::model::WorkItem) {
    /// let result = client
    ///     .process(&mut item, async |item| {
    ///         tracing::info!(reference = %item.reference, "working");
    ///         Ok::<_, ats_client::Error>(())
    ///     })
    ///     .await;
    /// # }
    /// ```
    pub async fn process<F, T, E>(
        &self,
        item: &mut WorkItem,
        f: F,
    ) -> std::result::Result<T, ProcessError<E>>
    where
        F: AsyncFnOnce(&mut WorkItem) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        let span = start_workitem_span(item);
        let started = Instant::now();

        let result = self.process_in_scope(item, f).instrument(span).await;

        metrics::processing_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("status", item.status.as_str())],
        );
        result
    }

    async fn process_in_scope<F, T, E>(
        &self,
        item: &mut WorkItem,
        f: F,
    ) -> std::result::Result<T, ProcessError<E>>
    where
        F: AsyncFnOnce(&mut WorkItem) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        if item.status != Status::InProgress {
            self.transition(item, Status::InProgress, "").await?;
        }

        let _guard = self.log_context().begin(item.id);
        debug!(%item, "processing work item");

        let outcome = AssertUnwindSafe(f(&mut *item)).catch_unwind().await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = format!("panicked: {}", panic_message(payload.as_ref()));
                self.fail_in_scope(item, message).await;
                panic::resume_unwind(payload);
            }
        };

        match outcome {
            Err(e) => {
                self.fail_in_scope(item, e.to_string()).await;
                Err(ProcessError::Task(e))
            }
            Ok(value) => {
                if item.status == Status::InProgress {
                    self.push_status(item, Status::Completed, DEFAULT_COMPLETE_MESSAGE.to_string())
                        .await?;
                }
                Ok(value)
            }
        }
    }

    /// Error path of a scope: skips the terminal check, logs a failed push.
    async fn fail_in_scope(&self, item: &mut WorkItem, message: String) {
        error!(item = %item.id, error = %message, "work item failed");
        if let Err(push) = self.push_status(item, Status::Failed, message).await {
            warn!(item = %item.id, error = %push, "could not mark work item failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
