//! HTTP transport for the GitHub REST API
//!
//! Uses ureq (sync HTTP); the pipeline calls it from `spawn_blocking`.

use crate::error::{PipelineError, PipelineResult};
use std::time::Duration;

/// Status and body of a completed request. Non-2xx statuses are not errors at
/// this layer; the client maps them.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal GET-only transport so the client can be exercised without a network
pub trait HttpTransport: Send + Sync {
    /// Perform an authenticated GET. Connection, TLS and timeout failures map
    /// to [`PipelineError::TransientNetwork`].
    fn get(&self, url: &str, query: &[(&str, String)], token: &str)
        -> PipelineResult<HttpResponse>;
}

/// Production transport backed by a shared `ureq::Agent`
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::config::Config::builder()
            .http_status_as_error(false) // Status codes are mapped by the client
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl HttpTransport for UreqTransport {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> PipelineResult<HttpResponse> {
        let mut req = self
            .agent
            .get(url)
            .header("Authorization", &format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", concat!("orgstats/", env!("CARGO_PKG_VERSION")));

        for (key, value) in query {
            req = req.query(*key, value);
        }

        let response = req
            .call()
            .map_err(|e| PipelineError::TransientNetwork(format!("GET {}: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| PipelineError::TransientNetwork(format!("GET {}: {}", url, e)))?;

        Ok(HttpResponse { status, body })
    }
}
