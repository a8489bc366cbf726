//! Work items and their lifecycle status.
//!
//! A work item is one unit of work handed out by a work queue. It carries an
//! open JSON payload, a human-readable reference and a forward-only status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::timestamp;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Server-assigned work item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub i64);

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned work queue id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkqueueId(pub i64);

impl fmt::Display for WorkqueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work item.
///
/// `Pending → InProgress → {Completed | Failed | PendingUser}`. Nothing moves
/// back to `Pending`. `PendingUser` waits for an operator and is not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Enqueued, not yet handed out.
    #[serde(rename = "new", alias = "pending")]
    Pending,
    /// Handed out to a consumer.
    #[serde(rename = "in progress", alias = "in_progress")]
    InProgress,
    /// Done successfully. Terminal.
    #[serde(rename = "completed")]
    Completed,
    /// Done unsuccessfully. Terminal.
    #[serde(rename = "failed")]
    Failed,
    /// Parked until a person resumes it out of band.
    #[serde(rename = "pending user action", alias = "pending_user")]
    PendingUser,
}

impl Status {
    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    /// Can a consumer explicitly move an item into this status?
    pub fn is_transition_target(self) -> bool {
        !matches!(self, Status::Pending)
    }

    /// The server's spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "new",
            Status::InProgress => "in progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::PendingUser => "pending user action",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" | "pending" => Ok(Status::Pending),
            "in progress" | "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            "pending user action" | "pending_user" => Ok(Status::PendingUser),
            other => Err(crate::error::Error::Other(format!(
                "unknown work item status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work fetched from (or added to) a work queue.
///
/// Mutate it only through the client (`update`, `complete`, `fail`, ...) so
/// the local copy never runs ahead of the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,

    /// Human-readable label, fixed at enqueue time.
    pub reference: String,

    /// Open-ended payload. Opaque to the client.
    #[serde(default)]
    pub data: Map<String, Value>,

    pub status: Status,

    /// Outcome note from the last status change.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,

    #[serde(default)]
    pub locked: bool,

    pub workqueue_id: WorkqueueId,

    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WorkItem(id={}, reference={}, status={})",
            self.id, self.reference, self.status
        )
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Shallow merge: top-level keys of `partial` overwrite those in `base`.
pub(crate) fn merge_data(base: &Map<String, Value>, partial: Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    merged.extend(partial);
    merged
}
