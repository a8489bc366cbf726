//! Entry point for workers run by the automation server.
//!
//! A dispatched worker gets its server URL, token and session id through the
//! environment. [`AutomationServer::from_environment`] turns that into a
//! [`Client`] plus the session's process and work queue.

use std::fmt;

use tracing::{debug, info};

use crate::client::{Client, Workqueue};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Process, Session, SessionId, WorkqueueId};
use crate::telemetry::{AuditLogLayer, AuditShipper};

#[derive(Debug)]
pub struct AutomationServer {
    client: Client,
    session_id: Option<SessionId>,
    session: Option<Session>,
    process: Option<Process>,
    workqueue_id: Option<WorkqueueId>,
}

impl AutomationServer {
    /// Load `.env` and the `ATS_*` variables, then [`connect`](Self::connect).
    pub async fn from_environment() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Config::from_env()?;
        Self::connect(&config).await
    }

    /// Build the client and, when a session is configured, resolve its
    /// process and work queue. `workqueue_override` wins over the process's
    /// queue.
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::connect_with(Client::from_config(config)?, config).await
    }

    /// Like [`connect`](Self::connect), but with a client built beforehand,
    /// typically one whose audit layer is already installed so that the
    /// session lookups are logged too.
    pub async fn connect_with(client: Client, config: &Config) -> Result<Self> {
        let (session, process) = match config.session {
            Some(id) => {
                let session = client.get_session(id).await?;
                let process = client.get_process(session.process_id).await?;
                debug!(session = %id, process = %process.name, "resolved session");
                (Some(session), Some(process))
            }
            None => (None, None),
        };

        let workqueue_id = config
            .workqueue_override
            .or_else(|| process.as_ref().and_then(|p| p.workqueue_id));

        let server = Self {
            client,
            session_id: config.session,
            session,
            process,
            workqueue_id,
        };
        info!(%server, "connected to automation server");
        Ok(server)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn process(&self) -> Option<&Process> {
        self.process.as_ref()
    }

    pub fn workqueue_id(&self) -> Option<WorkqueueId> {
        self.workqueue_id
    }

    /// Cursor over this worker's work queue.
    pub fn workqueue(&self) -> Result<Workqueue> {
        self.workqueue_id
            .map(|id| self.client.workqueue(id))
            .ok_or(Error::NoWorkqueue)
    }

    /// Audit log layer shipping to this worker's session. Disabled when no
    /// session is configured. Must be called inside a tokio runtime.
    pub fn audit_layer(&self) -> (AuditLogLayer, Option<AuditShipper>) {
        AuditLogLayer::for_client(&self.client, self.session_id)
    }
}

impl fmt::Display for AutomationServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "AutomationServer(url={}, session={}, process={}, workqueue={})",
            self.client.base_url(),
            opt(self.session_id.map(|s| s.to_string())),
            opt(self.process.as_ref().map(|p| p.name.clone())),
            opt(self.workqueue_id.map(|q| q.to_string())),
        )
    }
}
