//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if the server URL is missing.
//! The API token is wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use crate::model::{SessionId, WorkqueueId};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    /// Base URL of the automation server API, without trailing slash.
    pub url: String,
    pub token: Option<SecretString>,
    /// Session this worker runs under. Audit logs are only shipped when set.
    pub session: Option<SessionId>,
    pub resource: Option<String>,
    pub process: Option<String>,
    /// Forces a work queue regardless of what the session's process says.
    pub workqueue_override: Option<WorkqueueId>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let url = required_var("ATS_URL")?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            token: optional_var("ATS_TOKEN").map(SecretString::from),
            session: parse_var("ATS_SESSION")?.map(SessionId),
            resource: optional_var("ATS_RESOURCE"),
            process: optional_var("ATS_PROCESS"),
            workqueue_override: parse_var("ATS_WORKQUEUE_OVERRIDE")?.map(WorkqueueId),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// Unset and empty are the same thing.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var(name: &str) -> Result<Option<i64>> {
    optional_var(name)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|e| Error::Config(format!("{name} must be an integer, got {raw:?}: {e}")))
        })
        .transpose()
}
