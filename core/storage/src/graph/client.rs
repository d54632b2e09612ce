//! Microsoft Graph transport.

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use drivekv_common::{Error, Result};

use crate::paths::GRAPH_BASE;
use crate::transport::Transport;

/// Authenticated HTTP client for the Graph API.
///
/// Requests are sent once; the caller decides what to do with failures.
pub struct GraphTransport {
    http: Client,
    base: String,
}

impl GraphTransport {
    /// Create a new Graph transport.
    ///
    /// # Errors
    /// - The HTTP client could not be built (TLS backend unavailable)
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a transport with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivekv/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport(0, format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base: GRAPH_BASE.to_string(),
        })
    }

    /// Transport against a local server, bypassing any system proxy.
    #[cfg(test)]
    fn local(base: impl Into<String>) -> Self {
        Self {
            http: Client::builder().no_proxy().build().unwrap(),
            base: base.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Map a finished request to the transport contract.
    async fn handle_response(method: &str, path: &str, response: Response) -> Result<Value> {
        let status = response.status();
        debug!("{} {} -> {}", method, path, status);

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| Error::transport(status.as_u16(), format!("Failed to read body: {}", e)))?;
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body)
                .map_err(|e| Error::Parse(format!("Invalid JSON from {}: {}", path, e)));
        }

        let status_text = status.canonical_reason().unwrap_or("").to_string();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized(status_text));
        }
        Err(Error::transport(status.as_u16(), status_text))
    }
}

/// Network-level failure: no HTTP status was received.
fn network_error(e: reqwest::Error) -> Error {
    Error::transport(0, e.to_string())
}

#[async_trait]
impl Transport for GraphTransport {
    fn name(&self) -> &str {
        "graph"
    }

    async fn get(&self, token: &str, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        Self::handle_response("GET", path, response).await
    }

    async fn post(&self, token: &str, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        Self::handle_response("POST", path, response).await
    }

    async fn put(&self, token: &str, path: &str, body: String) -> Result<Value> {
        let response = self
            .http
            .put(self.url(path))
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(network_error)?;

        Self::handle_response("PUT", path, response).await
    }

    async fn delete(&self, token: &str, path: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        Self::handle_response("DELETE", path, response).await.map(|_| ())
    }
}
