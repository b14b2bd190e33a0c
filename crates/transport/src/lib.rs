//! HTTP transport adapter.
//!
//! Implements [`trigger::WebhookTransport`] over a shared [`reqwest::Client`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Method mapping, header assembly, and status handling
//! live here. The [`trigger`] crate sees only the port trait, and the request
//! it hands over is already fully resolved: URL, ordered headers, and body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{debug, warn};
use trigger::{HttpMethod, TransportError, WebhookRequest, WebhookResponse, WebhookTransport};

/// Request timeout applied when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends webhook requests with `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// A transport with [`DEFAULT_TIMEOUT`].
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Every request fails with [`TransportError::Network`] once `timeout`
    /// elapses.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("cannot build HTTP client: {e}")))?;
        debug!(timeout_ms = timeout.as_millis() as u64, "HTTP client ready");
        Ok(Self { client })
    }

    /// Wraps an existing client, keeping its configuration.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn send(&self, request: WebhookRequest) -> Result<WebhookResponse, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), request.url.clone());
        for header in &request.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                TransportError::InvalidRequest(e.to_string())
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if status.is_success() {
            debug!(status = status.as_u16(), bytes = body.len(), "Webhook response received");
            Ok(WebhookResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            warn!(status = status.as_u16(), "Webhook endpoint returned an error status");
            Err(TransportError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}
