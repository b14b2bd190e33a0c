//! The trigger controller: permission gate, loading and message state, and the
//! single `trigger()` action shared by manual clicks and the change watcher.
//!
//! ## State
//!
//! `is_loading` is set while at least one invocation is in flight. `message`
//! is an overlay set when an invocation settles and cleared by an owned timer
//! after the configured display duration; a newer message replaces the timer.
//!
//! ## Overlapping invocations
//!
//! Invocations are not serialised. Each one takes a sequence number when it
//! starts, and only the most recently started invocation may write the
//! message when it settles. A slower, older invocation settling later is
//! reported as [`TriggerOutcome::Superseded`] and leaves the message alone.
//!
//! ## Watches
//!
//! Two independent [`ChangeWatcher`]s may be active. The payload watch covers
//! the table behind a table or view body and only keeps that body current; it
//! runs whatever the auto-rebuild and ignore settings say. The auto-rebuild
//! watch covers the watch set and feeds record changes to the debouncer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use trigger::{
    settle_message, DataSourceMode, HostData, InvocationId, InvocationResponse, PayloadBuilder,
    PayloadError, TableId, Timestamp, TriggerError, TriggerSettings, WebhookInvoker,
    WebhookTransport,
};

use crate::debounce::Debouncer;
use crate::timer::TimerSlot;
use crate::watcher::{ChangeEvent, ChangeWatcher};

/// Quiet period after the last observed change before an automatic trigger.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(60);

/// The controller could not be mounted.
#[derive(Debug, Error)]
pub enum MountError {
    /// Timers and the watcher need a tokio runtime.
    #[error("TriggerController must be mounted inside a tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

/// Observable widget state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerState {
    pub is_loading: bool,
    /// Empty when no message is shown.
    pub message: String,
    pub shown_at: Option<Timestamp>,
}

/// What a call to [`TriggerController::trigger`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The permission gate refused; nothing changed.
    Skipped,
    /// The endpoint answered with a 2xx status. `message` is what is now
    /// displayed (the fail template when the response was empty).
    Succeeded {
        invocation: InvocationId,
        response: InvocationResponse,
        message: String,
    },
    /// The request or payload failed; the fail template is displayed.
    Failed {
        invocation: InvocationId,
        error: TriggerError,
        message: String,
    },
    /// A newer invocation started before this one settled, or the controller
    /// was unmounted meanwhile; the message was left unchanged.
    Superseded {
        invocation: InvocationId,
        result: Result<InvocationResponse, TriggerError>,
    },
}

#[derive(Default)]
struct StateCell {
    view: TriggerState,
    in_flight: usize,
    latest_started: u64,
    message_epoch: u64,
}

struct Inner {
    settings: TriggerSettings,
    host: Arc<dyn HostData>,
    invoker: WebhookInvoker,
    payload: Mutex<PayloadBuilder>,
    state: Mutex<StateCell>,
    sequence: AtomicU64,
    mounted: AtomicBool,
    clear_timer: TimerSlot,
    debouncer: Debouncer,
    watcher: Mutex<Option<ChangeWatcher>>,
    payload_watcher: Mutex<Option<ChangeWatcher>>,
}

/// Orchestrates one mounted widget. Dropping the controller unmounts it.
pub struct TriggerController {
    inner: Arc<Inner>,
}

impl TriggerController {
    /// Mounts a controller. With auto-rebuild enabled, starts watching every
    /// host table outside the ignore list.
    pub fn mount(
        settings: TriggerSettings,
        host: Arc<dyn HostData>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Result<Self, MountError> {
        Self::mount_with_window(settings, host, transport, DEBOUNCE_WINDOW)
    }

    /// As [`TriggerController::mount`] with a custom debounce window.
    pub fn mount_with_window(
        settings: TriggerSettings,
        host: Arc<dyn HostData>,
        transport: Arc<dyn WebhookTransport>,
        debounce_window: Duration,
    ) -> Result<Self, MountError> {
        let runtime = Handle::try_current()?;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let for_debounce = weak.clone();
            let debouncer = Debouncer::new(
                runtime.clone(),
                debounce_window,
                Arc::new(move || {
                    if let Some(inner) = for_debounce.upgrade() {
                        tokio::spawn(async move {
                            inner.run_trigger().await;
                        });
                    }
                }),
            );

            Inner {
                payload: Mutex::new(PayloadBuilder::new(settings.data_source.clone())),
                settings,
                host,
                invoker: WebhookInvoker::new(transport),
                state: Mutex::new(StateCell::default()),
                sequence: AtomicU64::new(0),
                mounted: AtomicBool::new(true),
                clear_timer: TimerSlot::new(runtime),
                debouncer,
                watcher: Mutex::new(None),
                payload_watcher: Mutex::new(None),
            }
        });

        if !matches!(inner.settings.data_source, DataSourceMode::Manual(_)) {
            if let Err(e) = inner.refresh_payload() {
                warn!(error = %e, "Initial payload build failed");
            }
        }

        if let Some(table) = payload_table(&inner.settings.data_source) {
            let watcher = inner.watch_payload_table(table);
            *inner.payload_watcher.lock() = watcher;
        }

        if inner.settings.watch.enabled {
            let tables = inner.settings.watch.watch_set(&inner.host.tables());
            let weak = Arc::downgrade(&inner);
            let watcher = ChangeWatcher::start(
                inner.host.clone(),
                tables,
                Arc::new(move |event: ChangeEvent| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_data_change(event);
                    }
                }),
            );
            info!(tables = watcher.watched_tables().len(), "Auto-rebuild enabled");
            *inner.watcher.lock() = Some(watcher);
        }

        debug!(mode = inner.settings.data_source.kind(), "Trigger controller mounted");
        Ok(Self { inner })
    }

    /// Sends the webhook if the gate allows it.
    pub async fn trigger(&self) -> TriggerOutcome {
        self.inner.run_trigger().await
    }

    /// Whether the current session may trigger (rule and target URL).
    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    /// A copy of the current loading/message state.
    pub fn state(&self) -> TriggerState {
        self.inner.state.lock().view.clone()
    }

    /// The body as it would be sent now, if materialized.
    pub fn payload(&self) -> Option<String> {
        self.inner.payload.lock().current().map(str::to_string)
    }

    /// Pulls fresh data from the host into the payload. The host calls this
    /// whenever the data behind a table, view, or selection body changes.
    pub fn refresh_payload(&self) -> Result<(), PayloadError> {
        self.inner.refresh_payload()
    }

    /// Whether an automatic trigger is waiting for the debounce window.
    pub fn has_pending_auto_trigger(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Number of records currently watched for changes.
    pub fn watched_record_count(&self) -> usize {
        self.inner
            .watcher
            .lock()
            .as_ref()
            .map_or(0, ChangeWatcher::watched_record_count)
    }

    /// Cancels pending timers and releases every host subscription.
    /// Invocations still in flight settle without changing the message.
    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for TriggerController {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for TriggerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerController")
            .field("mode", &self.inner.settings.data_source.kind())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn payload_table(mode: &DataSourceMode) -> Option<&TableId> {
    match mode {
        DataSourceMode::Table(table) | DataSourceMode::View(table, _) => Some(table),
        DataSourceMode::Manual(_) | DataSourceMode::Cells => None,
    }
}

impl Inner {
    fn is_enabled(&self) -> bool {
        let user = self.host.current_user();
        self.settings.permission.allows(
            &self.settings.webhook,
            user.as_ref(),
            &self.host.collaborators(),
            self.host.creator().as_ref(),
        )
    }

    fn refresh_payload(&self) -> Result<(), PayloadError> {
        self.payload.lock().rebuild(self.host.as_ref())
    }

    /// Subscribes to the table behind a table or view body.
    fn watch_payload_table(self: &Arc<Self>, table: &TableId) -> Option<ChangeWatcher> {
        let Some(info) = self.host.tables().into_iter().find(|t| &t.id == table) else {
            warn!(%table, "Payload table not found; body refreshes on trigger only");
            return None;
        };
        let weak = Arc::downgrade(self);
        Some(ChangeWatcher::start(
            self.host.clone(),
            vec![info],
            Arc::new(move |event: ChangeEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_payload_change(&event);
                }
            }),
        ))
    }

    fn on_payload_change(&self, event: &ChangeEvent) {
        if !self.mounted.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.refresh_payload() {
            warn!(table = %event.table(), error = %e, "Payload refresh failed");
        }
    }

    fn on_data_change(&self, event: ChangeEvent) {
        if !self.mounted.load(Ordering::SeqCst) {
            return;
        }
        let ChangeEvent::Record { table, .. } = &event else {
            trace!(table = %event.table(), "Membership change does not schedule a trigger");
            return;
        };
        if let Err(e) = self.refresh_payload() {
            warn!(%table, error = %e, "Payload refresh failed");
        }
        self.debouncer.call();
    }

    async fn run_trigger(self: &Arc<Self>) -> TriggerOutcome {
        if !self.mounted.load(Ordering::SeqCst) {
            return TriggerOutcome::Skipped;
        }
        if !self.is_enabled() {
            debug!(
                rule = self.settings.permission.rule.kind(),
                has_target = self.settings.webhook.has_target(),
                "Trigger not permitted"
            );
            return TriggerOutcome::Skipped;
        }

        let invocation = InvocationId::new_random();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let span = info_span!("trigger", %invocation, sequence);

        async move {
            {
                let mut state = self.state.lock();
                state.in_flight += 1;
                state.latest_started = sequence;
                state.view.is_loading = true;
            }

            let result = self.send().await;
            self.settle(invocation, sequence, result)
        }
        .instrument(span)
        .await
    }

    async fn send(&self) -> Result<InvocationResponse, TriggerError> {
        let body = self.payload.lock().materialize(self.host.as_ref())?;
        Ok(self.invoker.invoke(&self.settings.webhook, &body).await?)
    }

    fn settle(
        self: &Arc<Self>,
        invocation: InvocationId,
        sequence: u64,
        result: Result<InvocationResponse, TriggerError>,
    ) -> TriggerOutcome {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.view.is_loading = state.in_flight > 0;

        if !self.mounted.load(Ordering::SeqCst) || state.latest_started != sequence {
            debug!("Invocation superseded; message left unchanged");
            return TriggerOutcome::Superseded { invocation, result };
        }

        let message = settle_message(&self.settings.templates, &result);
        state.view.message = message.clone();
        state.view.shown_at = Some(Timestamp::now());
        state.message_epoch += 1;
        let epoch = state.message_epoch;
        drop(state);

        self.schedule_clear(epoch);

        match result {
            Ok(response) => {
                info!(status = response.status, "Trigger succeeded");
                TriggerOutcome::Succeeded {
                    invocation,
                    response,
                    message,
                }
            }
            Err(error) => {
                warn!(error = %error, "Trigger failed");
                TriggerOutcome::Failed {
                    invocation,
                    error,
                    message,
                }
            }
        }
    }

    fn schedule_clear(self: &Arc<Self>, epoch: u64) {
        let weak = Arc::downgrade(self);
        let delay = self.settings.templates.display_for.as_duration();
        self.clear_timer.schedule(delay, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if state.message_epoch == epoch {
                state.view.message.clear();
                state.view.shown_at = None;
            }
        });
    }

    fn shutdown(&self) {
        if !self.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        self.debouncer.cancel();
        self.clear_timer.cancel();
        let watcher = self.watcher.lock().take();
        drop(watcher);
        let payload_watcher = self.payload_watcher.lock().take();
        drop(payload_watcher);
        debug!("Trigger controller unmounted");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use host::{HostSnapshot, MemoryHost, RecordData, Selection, TableData, ViewData};
    use serde_json::{Map, Value};
    use tokio::sync::oneshot;
    use trigger::{
        FieldName, RecordId, Settings, TableId, TableName, TransportError, UserId, ViewId,
        WebhookRequest, WebhookResponse,
    };

    use super::*;

    type Reply = Result<WebhookResponse, TransportError>;

    enum Scripted {
        Now(Reply),
        Wait(oneshot::Receiver<Reply>),
    }

    /// Records every request and answers from a script. An empty script
    /// answers `{"response":"42"}`.
    #[derive(Default)]
    struct FakeTransport {
        sent: Mutex<Vec<WebhookRequest>>,
        script: Mutex<VecDeque<Scripted>>,
    }

    impl FakeTransport {
        fn reply(&self, reply: Reply) {
            self.script.lock().push_back(Scripted::Now(reply));
        }

        fn gate(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.script.lock().push_back(Scripted::Wait(rx));
            tx
        }

        fn sent(&self) -> Vec<WebhookRequest> {
            self.sent.lock().clone()
        }

        fn bodies(&self) -> Vec<Option<String>> {
            self.sent.lock().iter().map(|r| r.body.clone()).collect()
        }
    }

    #[async_trait]
    impl WebhookTransport for FakeTransport {
        async fn send(&self, request: WebhookRequest) -> Reply {
            self.sent.lock().push(request);
            let next = self.script.lock().pop_front();
            match next {
                Some(Scripted::Now(reply)) => reply,
                Some(Scripted::Wait(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Network("gate dropped".into()))),
                None => Ok(answer("42")),
            }
        }
    }

    fn answer(text: &str) -> WebhookResponse {
        WebhookResponse {
            status: 200,
            body: serde_json::json!({ "response": text }).to_string(),
        }
    }

    fn tid(id: &str) -> TableId {
        TableId::new(id).unwrap()
    }

    fn rid(id: &str) -> RecordId {
        RecordId::new(id).unwrap()
    }

    fn name_field() -> FieldName {
        FieldName::new("name").unwrap()
    }

    fn record(id: &str, name: &str) -> RecordData {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::from(name));
        RecordData {
            id: rid(id),
            fields,
        }
    }

    fn host() -> Arc<MemoryHost> {
        Arc::new(MemoryHost::new(HostSnapshot {
            current_user: UserId::new("usrA"),
            collaborators: vec![UserId::new("usrA").unwrap()],
            creator: UserId::new("usrA"),
            tables: vec![
                TableData {
                    id: tid("tbl1"),
                    name: TableName::new("Orders").unwrap(),
                    records: vec![record("recA", "a"), record("recB", "b")],
                    views: vec![ViewData {
                        id: ViewId::new("viw1").unwrap(),
                        record_ids: vec![rid("recB"), rid("recA")],
                    }],
                },
                TableData {
                    id: tid("tbl2"),
                    name: TableName::new("Logs").unwrap(),
                    records: vec![record("recL", "l")],
                    views: Vec::new(),
                },
            ],
            selection: None,
        }))
    }

    fn settings(extra: Value) -> TriggerSettings {
        let mut doc = serde_json::json!({
            "webhookLink": "https://hooks.example.com/run",
            "responseSuccess": "Done: [response]",
            "responseFail": "Nope",
        });
        if let (Some(doc), Value::Object(extra)) = (doc.as_object_mut(), extra) {
            doc.extend(extra);
        }
        Settings::from_json(&doc.to_string())
            .unwrap()
            .resolve()
            .unwrap()
    }

    fn mount(
        extra: Value,
        host: &Arc<MemoryHost>,
        transport: &Arc<FakeTransport>,
    ) -> TriggerController {
        TriggerController::mount(settings(extra), host.clone(), transport.clone()).unwrap()
    }

    async fn wait_for_sends(transport: &FakeTransport, count: usize) {
        while transport.sent.lock().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_mount_requires_runtime() {
        let result = TriggerController::mount(
            settings(Value::Null),
            host(),
            Arc::new(FakeTransport::default()),
        );
        assert!(matches!(result, Err(MountError::NoRuntime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_shows_message_then_clears_after_display_duration() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(Value::Null, &host, &transport);

        let outcome = controller.trigger().await;

        assert!(matches!(
            outcome,
            TriggerOutcome::Succeeded { ref message, .. } if message == "Done: 42"
        ));
        let state = controller.state();
        assert_eq!(state.message, "Done: 42");
        assert!(state.shown_at.is_some());
        assert!(!state.is_loading);

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert_eq!(controller.state().message, "Done: 42");

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(controller.state(), TriggerState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_message_restarts_clear_timer() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        transport.reply(Ok(answer("one")));
        transport.reply(Ok(answer("two")));
        let controller = mount(serde_json::json!({ "responseLength": "2000" }), &host, &transport);

        controller.trigger().await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        controller.trigger().await;

        // past the first message's deadline
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(controller.state().message, "Done: two");

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert!(controller.state().message.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_show_fail_template() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        transport.reply(Err(TransportError::Status {
            status: 500,
            body: "boom".into(),
        }));
        transport.reply(Ok(answer("")));
        let controller = mount(Value::Null, &host, &transport);

        let outcome = controller.trigger().await;
        assert!(matches!(
            outcome,
            TriggerOutcome::Failed {
                error: TriggerError::Transport(TransportError::Status { status: 500, .. }),
                ref message,
                ..
            } if message == "Nope"
        ));

        // an empty response is reported with the fail template
        let outcome = controller.trigger().await;
        assert!(matches!(
            outcome,
            TriggerOutcome::Succeeded { ref message, .. } if message == "Nope"
        ));
        assert_eq!(controller.state().message, "Nope");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_gate_skips_without_side_effects() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(
            serde_json::json!({ "permissionTrigger": "selected", "selectedUsers": ["usrB"] }),
            &host,
            &transport,
        );

        assert!(!controller.is_enabled());
        assert_eq!(controller.trigger().await, TriggerOutcome::Skipped);
        assert_eq!(controller.state(), TriggerState::default());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_disables_trigger() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(serde_json::json!({ "webhookLink": "" }), &host, &transport);

        assert!(!controller.is_enabled());
        assert_eq!(controller.trigger().await, TriggerOutcome::Skipped);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_invocation_writes_message() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let first_gate = transport.gate();
        let second_gate = transport.gate();
        let controller = Arc::new(mount(Value::Null, &host, &transport));

        let c = controller.clone();
        let first = tokio::spawn(async move { c.trigger().await });
        wait_for_sends(&transport, 1).await;
        assert!(controller.state().is_loading);

        let c = controller.clone();
        let second = tokio::spawn(async move { c.trigger().await });
        wait_for_sends(&transport, 2).await;

        second_gate.send(Ok(answer("second"))).unwrap();
        let outcome = second.await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Succeeded { .. }));
        assert_eq!(controller.state().message, "Done: second");
        // the first call is still outstanding
        assert!(controller.state().is_loading);

        first_gate.send(Ok(answer("first"))).unwrap();
        let outcome = first.await.unwrap();
        assert!(matches!(
            outcome,
            TriggerOutcome::Superseded { result: Ok(ref r), .. } if r.response == "first"
        ));
        let state = controller.state();
        assert_eq!(state.message, "Done: second");
        assert!(!state.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_body_is_sent_verbatim() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let raw = "{ \"keep\" :  \"spacing\" }";
        let controller = mount(
            serde_json::json!({ "webhookDataType": "manual", "webhookDataManual": raw }),
            &host,
            &transport,
        );

        assert_eq!(controller.payload().as_deref(), Some(raw));
        controller.trigger().await;

        let sent = transport.sent();
        assert_eq!(sent[0].method, trigger::HttpMethod::Post);
        assert_eq!(sent[0].url.as_str(), "https://hooks.example.com/run");
        assert_eq!(sent[0].body.as_deref(), Some(raw));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_request_has_no_body() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(serde_json::json!({ "webhookMethod": "GET" }), &host, &transport);

        controller.trigger().await;

        assert_eq!(transport.bodies(), vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_and_view_bodies_follow_host_order() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));

        let table = mount(
            serde_json::json!({ "webhookDataType": "table", "webhookDataTable": "tbl1" }),
            &host,
            &transport,
        );
        table.trigger().await;

        let view = mount(
            serde_json::json!({
                "webhookDataType": "view",
                "webhookDataTable": "tbl1",
                "webhookDataView": "viw1",
            }),
            &host,
            &transport,
        );
        view.trigger().await;

        assert_eq!(
            transport.bodies(),
            vec![
                Some(r#"[{"name":"a"},{"name":"b"}]"#.to_string()),
                Some(r#"[{"name":"b"},{"name":"a"}]"#.to_string()),
            ]
        );
    }

    fn table_mode(extra: Value) -> Value {
        let mut doc = serde_json::json!({ "webhookDataType": "table", "webhookDataTable": "tbl1" });
        if let (Some(doc), Value::Object(extra)) = (doc.as_object_mut(), extra) {
            doc.extend(extra);
        }
        doc
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_body_follows_edits_without_auto_rebuild() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(table_mode(Value::Null), &host, &transport);

        host.set_field(&tid("tbl1"), &rid("recA"), &name_field(), "a2").unwrap();
        host.insert_record(&tid("tbl1"), record("recC", "c")).unwrap();

        let expected = r#"[{"name":"a2"},{"name":"b"},{"name":"c"}]"#;
        assert_eq!(controller.payload().as_deref(), Some(expected));
        assert!(!controller.has_pending_auto_trigger());

        controller.trigger().await;
        assert_eq!(transport.bodies(), vec![Some(expected.to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inserted_row_reaches_body_without_scheduling_trigger() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(
            table_mode(serde_json::json!({ "autoRebuild": true })),
            &host,
            &transport,
        );

        host.insert_record(&tid("tbl1"), record("recC", "c")).unwrap();

        let expected = r#"[{"name":"a"},{"name":"b"},{"name":"c"}]"#;
        assert_eq!(controller.payload().as_deref(), Some(expected));
        assert!(!controller.has_pending_auto_trigger());

        controller.trigger().await;
        assert_eq!(transport.bodies(), vec![Some(expected.to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_payload_table_still_refreshes_body() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(
            table_mode(serde_json::json!({ "autoRebuild": true, "tableIgnore": "Orders" })),
            &host,
            &transport,
        );

        host.set_field(&tid("tbl1"), &rid("recB"), &name_field(), "b2").unwrap();

        assert_eq!(
            controller.payload().as_deref(),
            Some(r#"[{"name":"a"},{"name":"b2"}]"#)
        );
        assert!(!controller.has_pending_auto_trigger());
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_body_is_pulled_again_on_trigger() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(
            table_mode(serde_json::json!({ "webhookDataType": "view", "webhookDataView": "viw1" })),
            &host,
            &transport,
        );
        controller.trigger().await;

        // a view filter change alone produces no notification
        let mut snapshot = host.snapshot();
        snapshot.tables[0].views[0].record_ids = vec![rid("recA")];
        host.replace(snapshot);
        controller.trigger().await;

        assert_eq!(
            transport.bodies(),
            vec![
                Some(r#"[{"name":"b"},{"name":"a"}]"#.to_string()),
                Some(r#"[{"name":"a"}]"#.to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cells_body_snapshots_selection_per_trigger() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(serde_json::json!({ "webhookDataType": "cells" }), &host, &transport);

        controller.trigger().await;
        for id in ["recA", "recB"] {
            host.set_selection(Some(Selection {
                table: tid("tbl1"),
                record_ids: vec![rid(id)],
                fields: vec![name_field()],
            }));
            controller.trigger().await;
        }

        assert_eq!(
            transport.bodies(),
            vec![
                Some("[]".to_string()),
                Some(r#"[{"name":"a"}]"#.to_string()),
                Some(r#"[{"name":"b"}]"#.to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_burst_fires_one_trigger_with_fresh_data() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(
            serde_json::json!({
                "webhookDataType": "table",
                "webhookDataTable": "tbl1",
                "autoRebuild": true,
                "tableIgnore": "Logs",
            }),
            &host,
            &transport,
        );
        assert_eq!(controller.watched_record_count(), 2);
        assert!(!controller.has_pending_auto_trigger());

        host.set_field(&tid("tbl1"), &rid("recA"), &name_field(), "a2").unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        host.set_field(&tid("tbl1"), &rid("recB"), &name_field(), "b2").unwrap();
        assert_eq!(
            controller.payload().as_deref(),
            Some(r#"[{"name":"a2"},{"name":"b2"}]"#)
        );

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(transport.sent().is_empty());
        assert!(controller.has_pending_auto_trigger());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            transport.bodies(),
            vec![Some(r#"[{"name":"a2"},{"name":"b2"}]"#.to_string())]
        );
        assert_eq!(controller.state().message, "Done: 42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_table_changes_are_not_watched() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(
            serde_json::json!({ "autoRebuild": true, "tableIgnore": " Logs , Missing" }),
            &host,
            &transport,
        );

        host.set_field(&tid("tbl2"), &rid("recL"), &name_field(), "l2").unwrap();
        assert!(!controller.has_pending_auto_trigger());

        host.set_field(&tid("tbl1"), &rid("recA"), &name_field(), "a2").unwrap();
        assert!(controller.has_pending_auto_trigger());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_timers_and_subscriptions() {
        let (host, transport) = (host(), Arc::new(FakeTransport::default()));
        let controller = mount(serde_json::json!({ "autoRebuild": true }), &host, &transport);
        assert!(host.subscription_count() > 0);

        controller.trigger().await;
        host.set_field(&tid("tbl1"), &rid("recA"), &name_field(), "a2").unwrap();
        assert!(controller.has_pending_auto_trigger());

        controller.unmount();
        assert_eq!(host.subscription_count(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        host.set_field(&tid("tbl1"), &rid("recA"), &name_field(), "a3").unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.sent().len(), 1);
    }
}
