//! Core domain for the fetch trigger widget.
//!
//! This crate contains the trigger-and-payload pipeline's domain rules: who may
//! fire the webhook, what body is sent, how the request URL is resolved, and
//! which message the user sees afterwards. Infrastructure crates implement the
//! port traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype host identifiers (`TableId`, `RecordId`, etc.) |
//! | [`types`] | Shared value types (`WebhookConfig`, `DataSourceMode`, etc.) |
//! | [`settings`] | Configuration surface and its resolution |
//! | [`permission`] | Permission gate |
//! | [`payload`] | Request body construction |
//! | [`invoker`] | URL resolution, request assembly, response mapping |
//! | [`ports`] | `HostData` and `WebhookTransport` traits |
//! | [`errors`] | Error types |

pub mod errors;
pub mod identifiers;
pub mod invoker;
pub mod payload;
pub mod permission;
pub mod ports;
pub mod settings;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{ConfigError, HostError, PayloadError, TransportError, TriggerError};
pub use identifiers::{FieldName, InvocationId, RecordId, TableId, TableName, UserId, ViewId};
pub use invoker::{
    build_request, effective_url, extract_response_text, settle_message, InvocationResponse,
    WebhookInvoker,
};
pub use payload::{records_to_json, PayloadBuilder};
pub use permission::{can_trigger, PermissionPolicy, PermissionRule};
pub use ports::{
    HostData, RecordIdsObserver, RecordObserver, Subscription, WebhookRequest, WebhookResponse,
    WebhookTransport,
};
pub use settings::{parse_ignore_list, NumericText, Settings, TriggerSettings, WatchSettings};
pub use types::{
    DataSourceMode, Header, HttpMethod, MessageDuration, RecordSnapshot, RecordSource,
    ResponseTemplates, TableInfo, Timestamp, WebhookConfig,
};
