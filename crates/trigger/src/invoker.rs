//! Webhook invocation: URL resolution, request assembly, and response mapping.
//!
//! [`WebhookInvoker`] turns a [`WebhookConfig`] and a body into one
//! [`WebhookRequest`], hands it to the [`WebhookTransport`] port, and extracts
//! the response text. Mapping the outcome to a user-facing message lives in
//! [`settle_message`] so the controller can apply it to its own state.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::{
    Header, ResponseTemplates, TransportError, WebhookConfig, WebhookRequest, WebhookTransport,
};

/// Query parameter carrying the target origin when sending through a proxy.
pub const PROXY_TARGET_PARAM: &str = "target";

/// A successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResponse {
    pub status: u16,
    /// Text substituted for `[response]` in the success template.
    pub response: String,
}

/// Sends webhook requests through a [`WebhookTransport`].
#[derive(Clone)]
pub struct WebhookInvoker {
    transport: Arc<dyn WebhookTransport>,
}

impl WebhookInvoker {
    pub fn new(transport: Arc<dyn WebhookTransport>) -> Self {
        Self { transport }
    }

    /// Sends `body` as configured. A single attempt; any failure is final.
    pub async fn invoke(
        &self,
        config: &WebhookConfig,
        body: &str,
    ) -> Result<InvocationResponse, TransportError> {
        let request = build_request(config, body)?;
        info!(
            method = %request.method,
            url = %request.url,
            body_bytes = request.body.as_ref().map_or(0, String::len),
            "Sending webhook"
        );

        match self.transport.send(request).await {
            Ok(response) => {
                info!(status = response.status, "Webhook succeeded");
                Ok(InvocationResponse {
                    status: response.status,
                    response: extract_response_text(&response.body),
                })
            }
            Err(e) => {
                warn!(error = %e, "Webhook failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for WebhookInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookInvoker").finish_non_exhaustive()
    }
}

/// Resolves the URL the request is sent to.
///
/// Without a proxy this is the target origin followed by the effective path.
/// With a proxy the effective path is appended to the proxy's path and the
/// target origin travels in the [`PROXY_TARGET_PARAM`] query parameter.
pub fn effective_url(config: &WebhookConfig) -> Result<Url, TransportError> {
    let target = config
        .target_url
        .as_ref()
        .ok_or_else(|| TransportError::InvalidRequest("no webhook target configured".into()))?;
    let origin = target.origin().ascii_serialization();
    let path = config.effective_path();

    let Some(proxy) = &config.proxy_url else {
        return Url::parse(&format!("{origin}{path}"))
            .map_err(|e| TransportError::InvalidRequest(format!("{origin}{path}: {e}")));
    };

    let (path_only, target_query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path.as_str(), None),
    };
    let proxy_pairs: Vec<(String, String)> = proxy.query_pairs().into_owned().collect();

    let mut url = proxy.clone();
    url.set_path(&format!("{}{}", proxy.path().trim_end_matches('/'), path_only));
    url.set_query(target_query);
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &proxy_pairs {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(PROXY_TARGET_PARAM, &origin);
    }
    Ok(url)
}

/// Assembles the outbound request. The body is dropped for methods that carry
/// none, and a JSON content type is added unless a header already sets one.
pub fn build_request(config: &WebhookConfig, body: &str) -> Result<WebhookRequest, TransportError> {
    let url = effective_url(config)?;
    let mut headers = config.headers.clone();
    let body = config.http_method.allows_body().then(|| body.to_string());

    let has_content_type = headers
        .iter()
        .any(|h| h.name.eq_ignore_ascii_case("content-type"));
    if body.is_some() && !has_content_type {
        headers.push(Header::new("Content-Type", "application/json"));
    }

    Ok(WebhookRequest {
        method: config.http_method,
        url,
        headers,
        body,
    })
}

/// Extracts the response text from a response body.
///
/// A JSON object with a `response` member yields that member (strings
/// unquoted, other values as compact JSON); anything else is used verbatim.
pub fn extract_response_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut object)) => match object.remove("response") {
            Some(Value::String(text)) => text,
            Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}

/// The message to display once an invocation settles.
///
/// A successful call with an empty response counts as a failure.
pub fn settle_message<E>(
    templates: &ResponseTemplates,
    outcome: &Result<InvocationResponse, E>,
) -> String {
    match outcome {
        Ok(response) if !response.response.is_empty() => {
            templates.render_success(&response.response)
        }
        _ => templates.fail.clone(),
    }
}
