//! HTTP client for the automation server.
//!
//! One [`Client`] is a cheap-to-clone handle over a shared reqwest client,
//! the server base URL, the optional bearer token and the [`LogContext`] the
//! processing scope writes to. Endpoint groups live in submodules as extra
//! `impl Client` blocks.

pub mod queue;
pub mod session;
pub mod work;

pub use queue::Workqueue;

use std::sync::Arc;

use reqwest::header::HeaderValue;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::SecretString;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::config::secrets::{bearer_header, duplicate};
use crate::error::{Error, Result};
use crate::model::WorkqueueId;
use crate::telemetry::LogContext;

#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: String,
    /// Precomputed `Authorization` value, marked sensitive.
    authorization: Option<HeaderValue>,
    log_context: LogContext,
}

impl Client {
    /// Create a client for the API rooted at `base_url`
    /// (e.g. `http://localhost/api`).
    ///
    /// Fails with [`Error::Config`] if `token` cannot be sent as a header.
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>) -> Result<Self> {
        let authorization = token
            .as_ref()
            .map(|token| {
                bearer_header(token).ok_or_else(|| {
                    Error::Config(
                        "API token contains characters not allowed in an HTTP header".to_string(),
                    )
                })
            })
            .transpose()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("ats-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                authorization,
                log_context: LogContext::new(),
            }),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.url.clone(), config.token.as_ref().map(duplicate))
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Tracker of the work item currently being processed through this client.
    pub fn log_context(&self) -> &LogContext {
        &self.inner.log_context
    }

    /// Open a cursor over the queue `id`. No request is made until the first
    /// [`Workqueue::next_item`].
    pub fn workqueue(&self, id: WorkqueueId) -> Workqueue {
        Workqueue::new(self.clone(), id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Request builder for `path` with the bearer header attached.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.inner.http.request(method, self.url(path));
        match &self.inner.authorization {
            Some(value) => builder.header(reqwest::header::AUTHORIZATION, value.clone()),
            None => builder,
        }
    }

    /// Send a request, turning any non-2xx status into [`Error::Status`].
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        let method = request.method().clone();
        let url = request.url().to_string();

        let response = self.inner.http.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Status {
            method,
            url,
            status,
            body,
        })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Ok(response.json().await?)
    }
}
