//! Port traits implemented by infrastructure crates.
//!
//! The domain never talks to the host application or the network directly.
//! [`HostData`] supplies identity, record reads, and live subscriptions;
//! [`WebhookTransport`] performs a single HTTP exchange. Infrastructure crates
//! (`host`, `transport`) implement these; tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::{
    Header, HostError, HttpMethod, RecordId, RecordSnapshot, RecordSource, TableId, TableInfo,
    TransportError, UserId,
};

// ---------------------------------------------------------------------------
// Host data
// ---------------------------------------------------------------------------

/// Receives the live record-id set of a table, in table order.
pub type RecordIdsObserver = Arc<dyn Fn(&[RecordId]) + Send + Sync>;

/// Receives the live field values of one record.
pub type RecordObserver = Arc<dyn Fn(&RecordSnapshot) + Send + Sync>;

/// Handle keeping a host subscription alive. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps the host's unsubscribe action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release (e.g. a static data source).
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Unsubscribes now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Pull-and-subscribe access to the host application's data.
///
/// ## Subscription contract
///
/// - A subscribe call delivers the current value to the observer once,
///   synchronously, before returning.
/// - Every later change is delivered again until the returned
///   [`Subscription`] is dropped.
/// - Implementations must not hold internal locks while invoking observers;
///   observers are allowed to call back into the host (for example to
///   subscribe to a newly added record).
pub trait HostData: Send + Sync {
    /// The user of the current session, `None` for anonymous sessions.
    fn current_user(&self) -> Option<UserId>;

    /// Users currently collaborating on the base.
    fn collaborators(&self) -> Vec<UserId>;

    /// The creator of the base, if the host exposes it.
    fn creator(&self) -> Option<UserId>;

    /// All tables in the base, in host order.
    fn tables(&self) -> Vec<TableInfo>;

    /// Records of a table (table order) or view (view filter and order).
    fn records(&self, source: &RecordSource) -> Result<Vec<RecordSnapshot>, HostError>;

    /// The current cell selection as records restricted to the selected
    /// fields, or `None` when nothing is selected.
    fn selected_cells(&self) -> Result<Option<Vec<RecordSnapshot>>, HostError>;

    /// Observes the record-id membership of a table.
    fn subscribe_record_ids(
        &self,
        table: &TableId,
        observer: RecordIdsObserver,
    ) -> Result<Subscription, HostError>;

    /// Observes the field values of one record.
    fn subscribe_record(
        &self,
        table: &TableId,
        record: &RecordId,
        observer: RecordObserver,
    ) -> Result<Subscription, HostError>;
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// A fully resolved outbound webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub method: HttpMethod,
    pub url: Url,
    /// Sent in order.
    pub headers: Vec<Header>,
    /// `None` for methods that carry no body.
    pub body: Option<String>,
}

/// A 2xx response from the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

/// Performs one HTTP exchange. No retries.
///
/// Implementations return [`TransportError::Status`] for any non-2xx answer so
/// that `Ok` always means success.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: WebhookRequest) -> Result<WebhookResponse, TransportError>;
}
