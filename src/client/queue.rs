//! Work queue operations: pull the next item, add items, clear.
//!
//! [`Workqueue`] is a single-pass cursor. Every [`Workqueue::next_item`] is a
//! live `GET /workqueues/{id}/next_item`; once the server answers 204 the
//! cursor is exhausted for good and answers `None` without asking again.

use futures::Stream;
use opentelemetry::KeyValue;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::Client;
use crate::error::{Error, Result};
use crate::model::{Status, WorkItem, WorkqueueId, WorkqueueInfo};
use crate::telemetry::metrics;

#[derive(Serialize)]
struct AddItemRequest<'a> {
    data: &'a Value,
    reference: &'a str,
}

#[derive(Serialize)]
struct ClearRequest {
    workitem_status: Option<Status>,
    days_older_than: Option<u32>,
}

/// Cursor over one remote work queue.
///
/// Drive it from a single consumer; `next_item` takes `&mut self` for that
/// reason. Create a new handle to scan the queue again.
#[derive(Debug)]
pub struct Workqueue {
    client: Client,
    id: WorkqueueId,
    exhausted: bool,
}

impl Workqueue {
    pub(crate) fn new(client: Client, id: WorkqueueId) -> Self {
        Self {
            client,
            id,
            exhausted: false,
        }
    }

    pub fn id(&self) -> WorkqueueId {
        self.id
    }

    /// Has the server reported the queue empty?
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the queue's metadata.
    pub async fn info(&self) -> Result<WorkqueueInfo> {
        self.client
            .get_json(&format!("/workqueues/{}", self.id))
            .await
    }

    /// Take the next item off the queue.
    ///
    /// Returns `Ok(None)` once the queue is empty, and on every call after
    /// that. An `Err` leaves the cursor usable; it is not retried.
    pub async fn next_item(&mut self) -> Result<Option<WorkItem>> {
        if self.exhausted {
            return Ok(None);
        }

        let path = format!("/workqueues/{}/next_item", self.id);
        let response = self
            .client
            .send(self.client.request(Method::GET, &path))
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            self.exhausted = true;
            self.record("next_item_empty");
            debug!(queue = %self.id, "work queue empty");
            return Ok(None);
        }

        let item: WorkItem = response.json().await?;
        self.record("next_item");
        debug!(queue = %self.id, item = %item.id, reference = %item.reference, "fetched work item");
        Ok(Some(item))
    }

    /// The cursor as a stream. Ends on the empty-queue signal; errors are
    /// yielded and do not end it.
    pub fn items(self) -> impl Stream<Item = Result<WorkItem>> {
        futures::stream::unfold(self, |mut queue| async move {
            match queue.next_item().await {
                Ok(Some(item)) => Some((Ok(item), queue)),
                Ok(None) => None,
                Err(e) => Some((Err(e), queue)),
            }
        })
    }

    /// Add a new item. `data` must be a JSON object, anything else fails
    /// with [`Error::InvalidData`] without a request.
    ///
    /// Returns the item as created by the server, normally `Status::Pending`.
    pub async fn add_item(&self, data: Value, reference: &str) -> Result<WorkItem> {
        if !data.is_object() {
            return Err(Error::InvalidData(format!(
                "expected a JSON object, got {data}"
            )));
        }

        let path = format!("/workqueues/{}/add", self.id);
        let body = AddItemRequest {
            data: &data,
            reference,
        };
        let response = self
            .client
            .send(self.client.request(Method::POST, &path).json(&body))
            .await?;
        let item: WorkItem = response.json().await?;

        self.record("add");
        debug!(queue = %self.id, item = %item.id, reference, "added work item");
        Ok(item)
    }

    /// Remove items from the queue, optionally only those with `status`
    /// and/or older than `days_older_than` days.
    pub async fn clear(&self, status: Option<Status>, days_older_than: Option<u32>) -> Result<()> {
        let path = format!("/workqueues/{}/clear", self.id);
        let body = ClearRequest {
            workitem_status: status,
            days_older_than,
        };
        self.client
            .send(self.client.request(Method::POST, &path).json(&body))
            .await?;

        self.record("clear");
        debug!(queue = %self.id, ?status, ?days_older_than, "cleared work queue");
        Ok(())
    }

    fn record(&self, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.id.to_string()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}
