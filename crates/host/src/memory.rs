//! [`MemoryHost`]: a [`HostData`] implementation backed by a [`HostSnapshot`].
//!
//! Mutations notify subscribers the way a live host does: record-id observers
//! when table membership changes, record observers when a record's values
//! change. Observers are always invoked after the internal lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, trace};

use trigger::{
    FieldName, HostData, HostError, RecordId, RecordIdsObserver, RecordObserver, RecordSnapshot,
    RecordSource, Subscription, TableId, TableInfo, UserId,
};

use crate::snapshot::{HostSnapshot, RecordData, Selection};

type SubscriptionKey = u64;

#[derive(Default)]
struct Inner {
    snapshot: HostSnapshot,
    id_observers: HashMap<SubscriptionKey, (TableId, RecordIdsObserver)>,
    record_observers: HashMap<SubscriptionKey, (TableId, RecordId, RecordObserver)>,
}

/// Deliveries collected under the lock and run after it is released.
#[derive(Default)]
struct Pending {
    ids: Vec<(RecordIdsObserver, Vec<RecordId>)>,
    records: Vec<(RecordObserver, RecordSnapshot)>,
}

impl Pending {
    fn deliver(self) {
        for (observer, ids) in self.ids {
            observer(&ids);
        }
        for (observer, record) in self.records {
            observer(&record);
        }
    }
}

/// In-memory host with live subscriptions.
pub struct MemoryHost {
    inner: Arc<Mutex<Inner>>,
    next_key: AtomicU64,
}

impl MemoryHost {
    pub fn new(snapshot: HostSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                snapshot,
                ..Inner::default()
            })),
            next_key: AtomicU64::new(1),
        }
    }

    /// A copy of the current data.
    pub fn snapshot(&self) -> HostSnapshot {
        self.lock().snapshot.clone()
    }

    /// Number of live subscriptions (record-id and record observers).
    pub fn subscription_count(&self) -> usize {
        let inner = self.lock();
        inner.id_observers.len() + inner.record_observers.len()
    }

    /// Sets one cell and notifies the record's observers.
    pub fn set_field(
        &self,
        table: &TableId,
        record: &RecordId,
        field: &FieldName,
        value: impl Into<Value>,
    ) -> Result<(), HostError> {
        let pending = {
            let mut inner = self.lock();
            let data = inner
                .snapshot
                .table_mut(table)
                .and_then(|t| t.records.iter_mut().find(|r| &r.id == record))
                .ok_or_else(|| HostError::RecordNotFound {
                    table: table.clone(),
                    record: record.clone(),
                })?;
            data.fields.insert(field.to_string(), value.into());
            let updated = data.to_snapshot(&[]);

            Pending {
                ids: Vec::new(),
                records: record_observers_for(&inner, table, record)
                    .into_iter()
                    .map(|observer| (observer, updated.clone()))
                    .collect(),
            }
        };
        debug!(%table, %record, %field, "Field updated");
        pending.deliver();
        Ok(())
    }

    /// Appends a record to a table and notifies membership observers.
    pub fn insert_record(&self, table: &TableId, record: RecordData) -> Result<(), HostError> {
        let pending = {
            let mut inner = self.lock();
            let data = inner
                .snapshot
                .table_mut(table)
                .ok_or_else(|| HostError::TableNotFound(table.clone()))?;
            data.records.push(record);
            let ids = data.record_ids();
            membership_pending(&inner, table, ids)
        };
        pending.deliver();
        Ok(())
    }

    /// Removes a record (from the table and its views) and notifies membership
    /// observers.
    pub fn remove_record(&self, table: &TableId, record: &RecordId) -> Result<(), HostError> {
        let pending = {
            let mut inner = self.lock();
            let data = inner
                .snapshot
                .table_mut(table)
                .ok_or_else(|| HostError::TableNotFound(table.clone()))?;
            let before = data.records.len();
            data.records.retain(|r| &r.id != record);
            if data.records.len() == before {
                return Err(HostError::RecordNotFound {
                    table: table.clone(),
                    record: record.clone(),
                });
            }
            for view in &mut data.views {
                view.record_ids.retain(|id| id != record);
            }
            let ids = data.record_ids();
            membership_pending(&inner, table, ids)
        };
        pending.deliver();
        Ok(())
    }

    /// Replaces the cell selection.
    pub fn set_selection(&self, selection: Option<Selection>) {
        self.lock().snapshot.selection = selection;
    }

    /// Replaces all data, notifying observers of every table whose membership
    /// changed and every record whose values changed.
    pub fn replace(&self, snapshot: HostSnapshot) {
        let pending = {
            let mut inner = self.lock();
            let previous = std::mem::replace(&mut inner.snapshot, snapshot);
            let mut pending = Pending::default();

            for table in &inner.snapshot.tables {
                let old = previous.table(&table.id);
                let ids = table.record_ids();
                if old.map(|t| t.record_ids()) != Some(ids.clone()) {
                    pending.ids.extend(membership_pending(&inner, &table.id, ids).ids);
                }
                for record in &table.records {
                    let unchanged = old
                        .and_then(|t| t.record(&record.id))
                        .is_some_and(|r| r.fields == record.fields);
                    if unchanged {
                        continue;
                    }
                    let updated = record.to_snapshot(&[]);
                    pending.records.extend(
                        record_observers_for(&inner, &table.id, &record.id)
                            .into_iter()
                            .map(|observer| (observer, updated.clone())),
                    );
                }
            }
            pending
        };
        debug!(
            membership = pending.ids.len(),
            records = pending.records.len(),
            "Host data replaced"
        );
        pending.deliver();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    fn register(
        &self,
        insert: impl FnOnce(&mut Inner, SubscriptionKey),
        remove: fn(&mut Inner, SubscriptionKey),
    ) -> Subscription {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        insert(&mut *self.lock(), key);

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                let mut inner = shared.lock();
                remove(&mut *inner, key);
                trace!(key, "Subscription released");
            }
        })
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

fn record_observers_for(inner: &Inner, table: &TableId, record: &RecordId) -> Vec<RecordObserver> {
    inner
        .record_observers
        .values()
        .filter(|(t, r, _)| t == table && r == record)
        .map(|(_, _, observer)| observer.clone())
        .collect()
}

fn membership_pending(inner: &Inner, table: &TableId, ids: Vec<RecordId>) -> Pending {
    Pending {
        ids: inner
            .id_observers
            .values()
            .filter(|(t, _)| t == table)
            .map(|(_, observer)| (observer.clone(), ids.clone()))
            .collect(),
        records: Vec::new(),
    }
}

impl HostData for MemoryHost {
    fn current_user(&self) -> Option<UserId> {
        self.lock().snapshot.current_user.clone()
    }

    fn collaborators(&self) -> Vec<UserId> {
        self.lock().snapshot.collaborators.clone()
    }

    fn creator(&self) -> Option<UserId> {
        self.lock().snapshot.creator.clone()
    }

    fn tables(&self) -> Vec<TableInfo> {
        self.lock().snapshot.tables.iter().map(|t| t.info()).collect()
    }

    fn records(&self, source: &RecordSource) -> Result<Vec<RecordSnapshot>, HostError> {
        let inner = self.lock();
        match source {
            RecordSource::Table(table) => {
                let data = inner
                    .snapshot
                    .table(table)
                    .ok_or_else(|| HostError::TableNotFound(table.clone()))?;
                Ok(data.records.iter().map(|r| r.to_snapshot(&[])).collect())
            }
            RecordSource::View(table, view) => {
                let data = inner
                    .snapshot
                    .table(table)
                    .ok_or_else(|| HostError::TableNotFound(table.clone()))?;
                let view_data = data.views.iter().find(|v| &v.id == view).ok_or_else(|| {
                    HostError::ViewNotFound {
                        table: table.clone(),
                        view: view.clone(),
                    }
                })?;
                Ok(view_data
                    .record_ids
                    .iter()
                    .filter_map(|id| data.record(id))
                    .map(|r| r.to_snapshot(&[]))
                    .collect())
            }
        }
    }

    fn selected_cells(&self) -> Result<Option<Vec<RecordSnapshot>>, HostError> {
        let inner = self.lock();
        let Some(selection) = &inner.snapshot.selection else {
            return Ok(None);
        };
        let data = inner
            .snapshot
            .table(&selection.table)
            .ok_or_else(|| HostError::TableNotFound(selection.table.clone()))?;
        Ok(Some(
            selection
                .record_ids
                .iter()
                .filter_map(|id| data.record(id))
                .map(|r| r.to_snapshot(&selection.fields))
                .collect(),
        ))
    }

    fn subscribe_record_ids(
        &self,
        table: &TableId,
        observer: RecordIdsObserver,
    ) -> Result<Subscription, HostError> {
        let ids = self
            .lock()
            .snapshot
            .table(table)
            .map(|t| t.record_ids())
            .ok_or_else(|| HostError::TableNotFound(table.clone()))?;

        let table_key = table.clone();
        let registered = observer.clone();
        let subscription = self.register(
            move |inner, key| {
                inner.id_observers.insert(key, (table_key, registered));
            },
            |inner, key| {
                inner.id_observers.remove(&key);
            },
        );
        observer(&ids);
        Ok(subscription)
    }

    fn subscribe_record(
        &self,
        table: &TableId,
        record: &RecordId,
        observer: RecordObserver,
    ) -> Result<Subscription, HostError> {
        let current = self
            .lock()
            .snapshot
            .table(table)
            .and_then(|t| t.record(record))
            .map(|r| r.to_snapshot(&[]))
            .ok_or_else(|| HostError::RecordNotFound {
                table: table.clone(),
                record: record.clone(),
            })?;

        let keys = (table.clone(), record.clone());
        let registered = observer.clone();
        let subscription = self.register(
            move |inner, key| {
                inner.record_observers.insert(key, (keys.0, keys.1, registered));
            },
            |inner, key| {
                inner.record_observers.remove(&key);
            },
        );
        observer(&current);
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::snapshot::{TableData, ViewData};
    use trigger::{TableName, ViewId};

    fn record(id: &str, name: &str) -> RecordData {
        let mut fields = serde_json::Map::new();
        fields.insert("name".into(), Value::from(name));
        RecordData {
            id: RecordId::new(id).unwrap(),
            fields,
        }
    }

    fn tbl() -> TableId {
        TableId::new("tbl1").unwrap()
    }

    fn host() -> MemoryHost {
        MemoryHost::new(HostSnapshot {
            tables: vec![TableData {
                id: tbl(),
                name: TableName::new("Orders").unwrap(),
                records: vec![record("rec1", "x"), record("rec2", "y")],
                views: vec![ViewData {
                    id: ViewId::new("viw1").unwrap(),
                    record_ids: vec![RecordId::new("rec2").unwrap()],
                }],
            }],
            ..HostSnapshot::default()
        })
    }

    #[test]
    fn test_view_records_follow_view_membership() {
        let host = host();
        let view = host
            .records(&RecordSource::View(tbl(), ViewId::new("viw1").unwrap()))
            .unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].value("name"), Some("y"));

        assert!(matches!(
            host.records(&RecordSource::View(tbl(), ViewId::new("nope").unwrap())),
            Err(HostError::ViewNotFound { .. })
        ));
    }

    #[test]
    fn test_subscription_delivers_initial_value_then_changes() {
        let host = host();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = host
            .subscribe_record(
                &tbl(),
                &RecordId::new("rec1").unwrap(),
                Arc::new(move |r: &RecordSnapshot| {
                    sink.lock().push(r.value("name").unwrap_or_default().to_string())
                }),
            )
            .unwrap();

        host.set_field(
            &tbl(),
            &RecordId::new("rec1").unwrap(),
            &FieldName::new("name").unwrap(),
            "z",
        )
        .unwrap();
        assert_eq!(*seen.lock(), vec!["x", "z"]);

        drop(sub);
        assert_eq!(host.subscription_count(), 0);
        host.set_field(
            &tbl(),
            &RecordId::new("rec1").unwrap(),
            &FieldName::new("name").unwrap(),
            "w",
        )
        .unwrap();
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_membership_changes_notify_id_observers() {
        let host = host();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = host
            .subscribe_record_ids(
                &tbl(),
                Arc::new(move |_: &[RecordId]| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        host.insert_record(&tbl(), record("rec3", "z")).unwrap();
        host.remove_record(&tbl(), &RecordId::new("rec2").unwrap()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(host
            .records(&RecordSource::View(tbl(), ViewId::new("viw1").unwrap()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_replace_only_notifies_changed_records() {
        let host = host();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut subs = Vec::new();
        for id in ["rec1", "rec2"] {
            let counter = calls.clone();
            subs.push(
                host.subscribe_record(
                    &tbl(),
                    &RecordId::new(id).unwrap(),
                    Arc::new(move |_: &RecordSnapshot| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap(),
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let mut next = host.snapshot();
        next.tables[0].records[1] = record("rec2", "changed");
        host.replace(next);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
