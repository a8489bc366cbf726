//! Session, process and credential lookups, and the session log endpoint.

use std::time::Duration;

use reqwest::Method;

use super::Client;
use crate::error::Result;
use crate::model::{Credential, Process, ProcessId, Session, SessionId};
use crate::telemetry::LogRecord;

/// Upper bound for a single log POST.
const LOG_POST_TIMEOUT: Duration = Duration::from_secs(10);

impl Client {
    pub async fn get_session(&self, id: SessionId) -> Result<Session> {
        self.get_json(&format!("/sessions/{id}")).await
    }

    pub async fn get_process(&self, id: ProcessId) -> Result<Process> {
        self.get_json(&format!("/processes/{id}")).await
    }

    /// Look up a credential by its name.
    pub async fn get_credential(&self, name: &str) -> Result<Credential> {
        self.get_json(&format!(
            "/credentials/by_name/{}",
            urlencoding::encode(name)
        ))
        .await
    }

    /// Send one audit log record for `session`.
    pub(crate) async fn post_session_log(&self, session: SessionId, record: &LogRecord) -> Result<()> {
        let path = format!("/sessions/{session}/log");
        self.send(
            self.request(Method::POST, &path)
                .timeout(LOG_POST_TIMEOUT)
                .json(record),
        )
        .await?;
        Ok(())
    }
}
