//! Error types for the trigger domain.
//!
//! Each component reports its own error enum. None of them is fatal to a
//! mounted widget: [`TransportError`] and [`HostError`] are recovered by
//! showing the fail message, [`ConfigError`] is reported once at settings
//! resolution, and [`PayloadError`] flags a misuse of the builder API.
//!
//! [`TriggerError`] is the umbrella type for callers that want a single `?`
//! target.

use thiserror::Error;

use crate::{RecordId, TableId, ViewId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The settings document could not be turned into typed settings.
///
/// Recoverable conditions (missing target URL, bad `responseLength`) degrade
/// gracefully instead and never produce this error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A URL-valued key holds text that is not an absolute URL.
    #[error("Setting '{key}' is not a valid URL: {value}")]
    InvalidUrl {
        /// Settings key, e.g. `webhookLink`.
        key: &'static str,
        /// The rejected value.
        value: String,
    },

    /// `webhookMethod` names a method outside GET/POST/PUT/PATCH/DELETE.
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// `webhookDataType` names an unknown data source.
    #[error("Unknown data source type: {0}")]
    UnknownDataSource(String),

    /// `permissionTrigger` names an unknown rule.
    #[error("Unknown permission rule: {0}")]
    UnknownPermission(String),

    /// A data source that needs a table or view was configured without one.
    #[error("Data source '{mode}' requires setting '{key}'")]
    MissingSetting {
        /// The data source tag (`table` or `view`).
        mode: &'static str,
        /// The settings key that must be provided.
        key: &'static str,
    },

    /// The settings document is not valid JSON of the expected shape.
    #[error("Malformed settings document: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// The webhook request did not complete with a 2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be built from the configuration.
    #[error("Invalid webhook request: {0}")]
    InvalidRequest(String),

    /// Connection, TLS, or timeout failure before a status was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-2xx status.
    #[error("Webhook responded with status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, kept for diagnostics.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Host data access
// ---------------------------------------------------------------------------

/// The host could not supply the requested data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error("View '{view}' not found in table '{table}'")]
    ViewNotFound {
        table: TableId,
        view: ViewId,
    },

    #[error("Record '{record}' not found in table '{table}'")]
    RecordNotFound {
        table: TableId,
        record: RecordId,
    },

    /// Any other host-side failure.
    #[error("Host data unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Misuse of the payload builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Data for one mode was handed to a builder configured for another.
    #[error("Payload builder is in '{configured}' mode; cannot accept {supplied} data")]
    ModeMismatch {
        configured: &'static str,
        supplied: &'static str,
    },

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Failed to serialise payload: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// Umbrella
// ---------------------------------------------------------------------------

/// Any error produced by the trigger domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}
