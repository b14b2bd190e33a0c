//! Shared value types for the trigger domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (an HTTP method decides whether a body may
//! be sent, a message duration is always strictly positive) and participate in
//! domain computations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{FieldName, RecordId, TableId, TableName, ViewId};

// ---------------------------------------------------------------------------
// Webhook request configuration
// ---------------------------------------------------------------------------

/// HTTP method used for the outbound webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Parses a method name case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Returns the canonical upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Returns `false` for methods whose requests are sent without a body.
    pub fn allows_body(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured request header. Order of headers is preserved on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Where and how the webhook request is sent.
///
/// Immutable for the lifetime of a mounted controller.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    /// Optional relay that forwards the request to the target.
    pub proxy_url: Option<Url>,
    /// The webhook endpoint. `None` disables triggering entirely.
    pub target_url: Option<Url>,
    /// Replaces the path of `target_url` when present. Always starts with `/`.
    pub path_override: Option<String>,
    pub http_method: HttpMethod,
    pub headers: Vec<Header>,
}

impl WebhookConfig {
    /// Returns `true` when a target URL is configured.
    pub fn has_target(&self) -> bool {
        self.target_url.is_some()
    }

    /// The path sent to the endpoint: the override if set, otherwise the path
    /// (and query string) of the target URL.
    pub fn effective_path(&self) -> String {
        if let Some(path) = &self.path_override {
            return path.clone();
        }
        match &self.target_url {
            Some(url) => match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            },
            None => "/".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Data source
// ---------------------------------------------------------------------------

/// Which host data supplies the request body. Exactly one is active, fixed by
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceMode {
    /// A raw body sent verbatim.
    Manual(String),
    /// The cells currently selected in the host, snapshotted at trigger time.
    Cells,
    /// Every record of a table, in table order.
    Table(TableId),
    /// The records visible in a view, in view order.
    View(TableId, ViewId),
}

impl DataSourceMode {
    /// Short lower-case tag used in logs and configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Manual(_) => "manual",
            Self::Cells => "cells",
            Self::Table(_) => "table",
            Self::View(_, _) => "view",
        }
    }
}

/// A record query issued to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    Table(TableId),
    View(TableId, ViewId),
}

// ---------------------------------------------------------------------------
// Host data snapshots
// ---------------------------------------------------------------------------

/// A table as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: TableId,
    pub name: TableName,
}

/// One record's field values, as display strings, in host field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub id: RecordId,
    pub fields: Vec<(FieldName, String)>,
}

impl RecordSnapshot {
    pub fn new(id: RecordId, fields: Vec<(FieldName, String)>) -> Self {
        Self { id, fields }
    }

    /// Looks up the display value of a field.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name.as_str() == field)
            .map(|(_, value)| value.as_str())
    }
}

// ---------------------------------------------------------------------------
// Response messages
// ---------------------------------------------------------------------------

/// How long a response message stays visible before it is cleared.
///
/// Always strictly positive; unparsable or non-positive input falls back to
/// [`MessageDuration::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageDuration(Duration);

impl MessageDuration {
    /// Fallback used when the configured value is missing or invalid.
    pub const DEFAULT: Self = Self(Duration::from_millis(5000));

    /// Creates a duration from milliseconds, returning `None` for zero.
    #[must_use]
    pub fn from_millis(millis: u64) -> Option<Self> {
        if millis == 0 {
            None
        } else {
            Some(Self(Duration::from_millis(millis)))
        }
    }

    /// Parses the numeric string from the settings surface (e.g. `"3000"`,
    /// `" 1e3 "`), falling back to the default for anything that is not a
    /// finite, positive number of milliseconds.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().parse::<f64>() {
            Ok(ms) if ms.is_finite() && ms >= 1.0 => Self(Duration::from_millis(ms as u64)),
            _ => Self::DEFAULT,
        }
    }

    /// Returns the underlying [`Duration`].
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl Default for MessageDuration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// User-facing message templates shown after an invocation settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTemplates {
    /// Shown on success; every `[response]` is replaced by the response text.
    pub success: String,
    /// Shown verbatim on failure.
    pub fail: String,
    pub display_for: MessageDuration,
}

impl ResponseTemplates {
    /// Placeholder substituted in the success template.
    pub const PLACEHOLDER: &'static str = "[response]";

    /// Renders the success template with `response` substituted for every
    /// placeholder occurrence.
    pub fn render_success(&self, response: &str) -> String {
        self.success.replace(Self::PLACEHOLDER, response)
    }
}

impl Default for ResponseTemplates {
    fn default() -> Self {
        Self {
            success: Self::PLACEHOLDER.to_string(),
            fail: "Failed to trigger webhook".to_string(),
            display_for: MessageDuration::DEFAULT,
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
