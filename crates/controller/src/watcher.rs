//! Observation of record changes across the watch set.
//!
//! Every watched table has a membership subscription; each record currently in
//! the table has its own value subscription. The host delivers the current
//! value as soon as a subscription is registered, so each subscription
//! swallows its first delivery: only later deliveries are changes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use trigger::{HostData, RecordId, RecordSnapshot, Subscription, TableId, TableInfo};

/// A change observed after the initial snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A record's values changed.
    Record { table: TableId, record: RecordId },
    /// Records were added to, removed from, or reordered in a table.
    Membership { table: TableId },
}

impl ChangeEvent {
    pub fn table(&self) -> &TableId {
        match self {
            Self::Record { table, .. } | Self::Membership { table } => table,
        }
    }
}

/// Invoked for every observed change. Not debounced.
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Keeps the subscriptions for a watch set alive. Dropping it unsubscribes
/// from everything.
pub struct ChangeWatcher {
    // Membership subscriptions go first so no new record subscriptions are
    // created while the tables below are torn down.
    membership: Vec<Subscription>,
    tables: Vec<Arc<TableWatch>>,
}

struct TableWatch {
    table: TableInfo,
    host: Arc<dyn HostData>,
    on_change: ChangeCallback,
    records: Mutex<HashMap<RecordId, Subscription>>,
    primed: AtomicBool,
}

impl ChangeWatcher {
    /// Subscribes to every table in `tables`. A table the host refuses to
    /// subscribe to is logged and skipped.
    pub fn start(
        host: Arc<dyn HostData>,
        tables: Vec<TableInfo>,
        on_change: ChangeCallback,
    ) -> Self {
        let mut watcher = Self {
            membership: Vec::with_capacity(tables.len()),
            tables: Vec::with_capacity(tables.len()),
        };

        for table in tables {
            let watch = Arc::new(TableWatch {
                table,
                host: host.clone(),
                on_change: on_change.clone(),
                records: Mutex::new(HashMap::new()),
                primed: AtomicBool::new(false),
            });
            let weak: Weak<TableWatch> = Arc::downgrade(&watch);
            let observer = Arc::new(move |ids: &[RecordId]| {
                if let Some(watch) = weak.upgrade() {
                    watch.sync(ids);
                }
            });

            match host.subscribe_record_ids(&watch.table.id, observer) {
                Ok(subscription) => {
                    debug!(
                        table = %watch.table.name,
                        records = watch.records.lock().len(),
                        "Watching table"
                    );
                    watcher.membership.push(subscription);
                    watcher.tables.push(watch);
                }
                Err(e) => warn!(table = %watch.table.name, error = %e, "Cannot watch table"),
            }
        }
        watcher
    }

    /// Tables with an active membership subscription.
    pub fn watched_tables(&self) -> Vec<TableId> {
        self.tables.iter().map(|t| t.table.id.clone()).collect()
    }

    /// Total number of records with an active value subscription.
    pub fn watched_record_count(&self) -> usize {
        self.tables.iter().map(|t| t.records.lock().len()).sum()
    }

    /// Unsubscribes from everything.
    pub fn stop(self) {
        drop(self);
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("tables", &self.watched_tables())
            .field("records", &self.watched_record_count())
            .finish()
    }
}

impl TableWatch {
    /// Reconciles record subscriptions with the table's current membership.
    /// Every delivery after the first is reported as a membership change.
    fn sync(&self, ids: &[RecordId]) {
        self.reconcile(ids);
        if self.primed.swap(true, Ordering::SeqCst) {
            debug!(table = %self.table.name, records = ids.len(), "Membership changed");
            (self.on_change)(ChangeEvent::Membership {
                table: self.table.id.clone(),
            });
        }
    }

    fn reconcile(&self, ids: &[RecordId]) {
        let present: HashSet<&RecordId> = ids.iter().collect();
        let mut records = self.records.lock();

        let before = records.len();
        records.retain(|id, _| present.contains(id));
        let removed = before - records.len();

        let mut added = 0;
        for id in ids {
            if records.contains_key(id) {
                continue;
            }
            match self
                .host
                .subscribe_record(&self.table.id, id, self.record_observer(id.clone()))
            {
                Ok(subscription) => {
                    records.insert(id.clone(), subscription);
                    added += 1;
                }
                Err(e) => warn!(
                    table = %self.table.name,
                    record = %id,
                    error = %e,
                    "Cannot watch record"
                ),
            }
        }

        if added > 0 || removed > 0 {
            trace!(table = %self.table.name, added, removed, "Record subscriptions updated");
        }
    }

    fn record_observer(&self, record: RecordId) -> Arc<dyn Fn(&RecordSnapshot) + Send + Sync> {
        let seen = AtomicBool::new(false);
        let table = self.table.id.clone();
        let on_change = self.on_change.clone();
        Arc::new(move |_: &RecordSnapshot| {
            if !seen.swap(true, Ordering::SeqCst) {
                trace!(%table, %record, "Initial observation skipped");
                return;
            }
            debug!(%table, %record, "Record changed");
            on_change(ChangeEvent::Record {
                table: table.clone(),
                record: record.clone(),
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use host::{HostSnapshot, MemoryHost, RecordData, TableData};
    use serde_json::{Map, Value};
    use trigger::{FieldName, TableName};

    use super::*;

    fn record(id: &str, name: &str) -> RecordData {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::from(name));
        RecordData {
            id: RecordId::new(id).unwrap(),
            fields,
        }
    }

    fn table(id: &str, name: &str, records: Vec<RecordData>) -> TableData {
        TableData {
            id: TableId::new(id).unwrap(),
            name: TableName::new(name).unwrap(),
            records,
            views: Vec::new(),
        }
    }

    fn rid(id: &str) -> RecordId {
        RecordId::new(id).unwrap()
    }

    fn tid(id: &str) -> TableId {
        TableId::new(id).unwrap()
    }

    fn name_field() -> FieldName {
        FieldName::new("name").unwrap()
    }

    fn setup() -> (Arc<MemoryHost>, ChangeWatcher, Arc<Mutex<Vec<ChangeEvent>>>) {
        let host = Arc::new(MemoryHost::new(HostSnapshot {
            tables: vec![table("tbl1", "Orders", vec![record("A", "a"), record("B", "b")])],
            ..HostSnapshot::default()
        }));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let watcher = ChangeWatcher::start(
            host.clone(),
            host.tables(),
            Arc::new(move |event: ChangeEvent| sink.lock().push(event)),
        );
        (host, watcher, events)
    }

    #[test]
    fn test_initial_observation_does_not_fire() {
        let (host, watcher, events) = setup();

        assert!(events.lock().is_empty());
        assert_eq!(watcher.watched_record_count(), 2);
        // one membership subscription plus one per record
        assert_eq!(host.subscription_count(), 3);
    }

    #[test]
    fn test_field_change_fires_callback() {
        let (host, _watcher, events) = setup();

        host.set_field(&tid("tbl1"), &rid("A"), &name_field(), "a2").unwrap();
        host.set_field(&tid("tbl1"), &rid("B"), &name_field(), "b2").unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                ChangeEvent::Record { table: tid("tbl1"), record: rid("A") },
                ChangeEvent::Record { table: tid("tbl1"), record: rid("B") },
            ]
        );
    }

    #[test]
    fn test_membership_changes_resubscribe_without_record_events() {
        let (host, watcher, events) = setup();

        host.insert_record(&tid("tbl1"), record("C", "c")).unwrap();
        host.remove_record(&tid("tbl1"), &rid("A")).unwrap();

        let membership = ChangeEvent::Membership { table: tid("tbl1") };
        assert_eq!(*events.lock(), vec![membership.clone(), membership]);
        assert_eq!(watcher.watched_record_count(), 2);
        assert_eq!(host.subscription_count(), 3);

        events.lock().clear();
        host.set_field(&tid("tbl1"), &rid("C"), &name_field(), "c2").unwrap();
        assert_eq!(
            *events.lock(),
            vec![ChangeEvent::Record { table: tid("tbl1"), record: rid("C") }]
        );
    }

    #[test]
    fn test_dropping_watcher_releases_every_subscription() {
        let (host, watcher, events) = setup();

        watcher.stop();
        assert_eq!(host.subscription_count(), 0);

        host.set_field(&tid("tbl1"), &rid("A"), &name_field(), "a2").unwrap();
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_unknown_table_is_skipped() {
        let host = Arc::new(MemoryHost::new(HostSnapshot::default()));
        let watcher = ChangeWatcher::start(
            host.clone(),
            vec![TableInfo {
                id: tid("missing"),
                name: TableName::new("Missing").unwrap(),
            }],
            Arc::new(|_: ChangeEvent| {}),
        );

        assert!(watcher.watched_tables().is_empty());
        assert_eq!(host.subscription_count(), 0);
    }
}
