//! Session, process, work queue and credential resources.

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::timestamp;
use super::work::WorkqueueId;

/// Server-assigned session id. A session is one dispatched run of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub i64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub process_id: ProcessId,
    pub resource_id: i64,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub dispatched_at: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(default)]
    pub stop_requested: bool,
    #[serde(default)]
    pub deleted: bool,
    /// Free-form parameters string passed to the process.
    #[serde(default)]
    pub parameters: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: String,
    pub target_type: String,
    pub target_source: String,
    pub target_credentials_id: Option<i64>,
    pub credentials_id: Option<i64>,
    /// The queue this process consumes, if any.
    pub workqueue_id: Option<WorkqueueId>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

/// Work queue metadata. The consuming handle is [`crate::client::Workqueue`].
#[derive(Debug, Clone, Deserialize)]
pub struct WorkqueueInfo {
    pub id: WorkqueueId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

/// A named credential stored on the server.
///
/// The password is wrapped so it never shows up in `Debug` output or logs.
#[derive(Debug, Deserialize)]
pub struct Credential {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub username: String,
    #[serde(deserialize_with = "secret")]
    pub password: SecretString,
    #[serde(default)]
    pub deleted: bool,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

fn secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(SecretString::from(String::deserialize(deserializer)?))
}
