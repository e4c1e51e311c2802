//! REST client for the remote fleet-management service
//!
//! Requests are made with the async `reqwest` client and driven to
//! completion with [`Handle::block_on`], which gives the rest of the crate a
//! synchronous SDK. These methods must run on a blocking-pool thread, never
//! on the event loop itself.

use std::future::Future;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::debug;

use super::{
    CommandOutput, Credentials, DeviceRecord, ExecOutcome, FleetConnector, FleetError,
    FleetSession,
};

#[derive(Clone)]
struct Endpoint {
    base_url: Url,
    client: reqwest::Client,
    runtime: Handle,
}

impl Endpoint {
    fn url(&self, segments: &[&str]) -> Result<Url, FleetError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FleetError::Internal(format!("service URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Opens [`HttpSession`]s against the service REST API
pub struct HttpConnector {
    endpoint: Endpoint,
}

impl HttpConnector {
    /// Build a connector for `base_url`
    ///
    /// Must be called from inside a tokio runtime; the runtime handle is
    /// captured to drive requests from worker threads.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, FleetError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FleetError::connection(format!("invalid service URL '{}': {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("radkit-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FleetError::Internal(format!("failed to build HTTP client: {}", e)))?;

        let runtime = Handle::try_current()
            .map_err(|e| FleetError::Internal(format!("no async runtime available: {}", e)))?;

        Ok(Self {
            endpoint: Endpoint {
                base_url,
                client,
                runtime,
            },
        })
    }
}

#[derive(Deserialize)]
struct SessionOpened {
    token: String,
}

#[derive(Deserialize)]
struct ResponseData {
    data: String,
}

/// Exec payloads come in two shapes: one aggregate result, or a list of
/// per-command results.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExecPayload {
    Single { result: ResponseData },
    PerCommand { results: Vec<CommandOutput> },
}

impl From<ExecPayload> for ExecOutcome {
    fn from(payload: ExecPayload) -> Self {
        match payload {
            ExecPayload::Single { result } => ExecOutcome::Single(result.data),
            ExecPayload::PerCommand { results } => ExecOutcome::PerCommand(results),
        }
    }
}

impl FleetConnector for HttpConnector {
    type Session = HttpSession;

    fn connect(&self, credentials: &Credentials) -> Result<HttpSession, FleetError> {
        let url = self.endpoint.url(&["sessions"])?;
        let body = serde_json::json!({
            "username": credentials.username,
            "service_code": credentials.access_code,
        });

        let token = self.endpoint.block_on(async {
            let response = self
                .endpoint
                .client
                .post(url)
                .json(&body)
                .send()
                .await
                .map_err(|e| FleetError::connection(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(FleetError::connection(format!(
                    "service rejected login (HTTP {}): {}",
                    status.as_u16(),
                    text.trim()
                )));
            }

            let opened: SessionOpened = response
                .json()
                .await
                .map_err(|e| FleetError::connection(format!("invalid session response: {}", e)))?;
            Ok(opened.token)
        })?;

        debug!(base_url = %self.endpoint.base_url, "Service session opened");
        Ok(HttpSession {
            endpoint: self.endpoint.clone(),
            token,
        })
    }
}

/// Authenticated session bound to a bearer token
pub struct HttpSession {
    endpoint: Endpoint,
    token: String,
}

impl HttpSession {
    async fn send(&self, request: RequestBuilder, device: Option<&str>) -> Result<Response, FleetError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FleetError::remote(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_to_error(status.as_u16(), &body, device))
    }
}

impl FleetSession for HttpSession {
    fn inventory(&self) -> Result<Vec<DeviceRecord>, FleetError> {
        let url = self.endpoint.url(&["inventory"])?;
        self.endpoint.block_on(async {
            let response = self.send(self.endpoint.client.get(url), None).await?;
            response
                .json()
                .await
                .map_err(|e| FleetError::remote(format!("invalid inventory payload: {}", e)))
        })
    }

    fn device(&self, name: &str) -> Result<DeviceRecord, FleetError> {
        let url = self.endpoint.url(&["inventory", name])?;
        self.endpoint.block_on(async {
            let response = self.send(self.endpoint.client.get(url), Some(name)).await?;
            response
                .json()
                .await
                .map_err(|e| FleetError::remote(format!("invalid device payload: {}", e)))
        })
    }

    fn exec(&self, device: &str, commands: &[String]) -> Result<ExecOutcome, FleetError> {
        let url = self.endpoint.url(&["inventory", device, "exec"])?;
        let body = serde_json::json!({ "commands": commands });

        self.endpoint.block_on(async {
            let request = self.endpoint.client.post(url).json(&body);
            let response = self.send(request, Some(device)).await?;
            let payload: ExecPayload = response
                .json()
                .await
                .map_err(|e| FleetError::remote(format!("invalid exec payload: {}", e)))?;
            Ok(payload.into())
        })
    }

    fn close(&self) -> Result<(), FleetError> {
        let url = self.endpoint.url(&["sessions", &self.token])?;
        self.endpoint.block_on(async {
            self.send(self.endpoint.client.delete(url), None).await?;
            Ok(())
        })
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn status_to_error(status: u16, body: &str, device: Option<&str>) -> FleetError {
    let body = body.trim();
    match (status, device) {
        (403, _) if body.is_empty() => FleetError::AccessDenied("Access denied".into()),
        (403, _) => FleetError::AccessDenied(body.to_string()),
        (404, Some(name)) => FleetError::DeviceNotFound(name.to_string()),
        _ => FleetError::remote(format!("HTTP {}: {}", status, body)),
    }
}
