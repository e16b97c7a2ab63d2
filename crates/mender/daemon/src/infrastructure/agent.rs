//! HTTP agent backend
//!
//! A remote agent runs next to the infrastructure and exposes:
//! - `GET {base_url}/resources/{id}/metrics` returning a flat metric object
//! - `POST {base_url}/operations/{name}` taking tool parameters and returning
//!   `{ success, message, metadata? }`

use std::time::Duration;

use async_trait::async_trait;
use mender_monitor::{MetricAdapter, MonitorError, MonitorResult};
use mender_tools::{BackendOutcome, ToolBackend, ToolCallResult, ToolError};
use mender_types::{MetricMap, ResourceDescriptor, ToolParams};
use reqwest::{Client, StatusCode};
use tracing::debug;

/// Client for a remote infrastructure agent.
#[derive(Debug, Clone)]
pub struct AgentClient {
    base_url: String,
    client: Client,
}

impl AgentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl MetricAdapter for AgentClient {
    fn name(&self) -> &str {
        "agent"
    }

    async fn read_metrics(&self, resource: &ResourceDescriptor) -> MonitorResult<MetricMap> {
        let url = self.url(&format!("resources/{}/metrics", resource.target()));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MonitorError::unavailable(&resource.id, e.to_string()))?;

        if !response.status().is_success() {
            return Err(MonitorError::unavailable(
                &resource.id,
                format!("agent returned {}", response.status()),
            ));
        }

        response
            .json::<MetricMap>()
            .await
            .map_err(|e| MonitorError::unavailable(&resource.id, format!("invalid metrics: {}", e)))
    }
}

#[async_trait]
impl ToolBackend for AgentClient {
    fn name(&self) -> &str {
        "agent"
    }

    async fn invoke(&self, operation: &str, params: &ToolParams) -> ToolCallResult<BackendOutcome> {
        let url = self.url(&format!("operations/{}", operation));
        debug!(operation, url = %url, "Dispatching operation to agent");

        let response = self
            .client
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| ToolError::AdapterUnavailable(format!("agent unreachable: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ToolError::ToolNotFound(operation.to_string()));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::AdapterUnavailable(format!("agent returned {}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(BackendOutcome::failed(format!("agent rejected {}: {}", operation, body)));
        }

        response
            .json::<BackendOutcome>()
            .await
            .map_err(|e| ToolError::Backend(format!("invalid agent response: {}", e)))
    }
}
