//! Error types for ats-client.

use thiserror::Error;

use crate::model::{Status, WorkItemId};

#[derive(Debug, Error)]
pub enum Error {
    /// The request never produced a usable response (connect, TLS, decode).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: reqwest::Method,
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The item already reached `completed` or `failed`.
    #[error("work item {id} is already {status}; cannot {action}")]
    TerminalState {
        id: WorkItemId,
        status: Status,
        action: String,
    },

    #[error("cannot transition a work item to {0}")]
    InvalidStatus(Status),

    #[error("no work queue configured for this session")]
    NoWorkqueue,

    #[error("configuration error: {0}")]
    Config(String),

    /// A payload the server would not accept, caught before sending.
    #[error("invalid work item data: {0}")]
    InvalidData(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status of a rejected request, if that is what this error is.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a failed [`Client::process`](crate::client::Client::process) scope.
///
/// `Task` carries the consumer's own error unchanged; `Client` means the
/// scope itself could not talk to the server.
#[derive(Debug, Error)]
pub enum ProcessError<E> {
    #[error("{0}")]
    Task(E),

    #[error(transparent)]
    Client(#[from] Error),
}

impl<E> ProcessError<E> {
    /// The consumer's error, if the task itself failed.
    pub fn into_task(self) -> Option<E> {
        match self {
            ProcessError::Task(e) => Some(e),
            ProcessError::Client(_) => None,
        }
    }
}
