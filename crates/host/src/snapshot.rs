//! Serialisable rendition of host data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use trigger::{FieldName, RecordId, RecordSnapshot, TableId, TableInfo, TableName, UserId, ViewId};

/// A snapshot document could not be read.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Malformed host snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Everything the widget can read from the host at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSnapshot {
    pub current_user: Option<UserId>,
    pub collaborators: Vec<UserId>,
    pub creator: Option<UserId>,
    pub tables: Vec<TableData>,
    pub selection: Option<Selection>,
}

/// A table with its records (table order) and views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableData {
    pub id: TableId,
    pub name: TableName,
    #[serde(default)]
    pub records: Vec<RecordData>,
    #[serde(default)]
    pub views: Vec<ViewData>,
}

/// A record's cell values keyed by field name, in field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    pub id: RecordId,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// The records a view currently shows, in view order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewData {
    pub id: ViewId,
    pub record_ids: Vec<RecordId>,
}

/// A rectangular cell selection: some records of one table and some fields.
/// An empty field list selects every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub table: TableId,
    pub record_ids: Vec<RecordId>,
    #[serde(default)]
    pub fields: Vec<FieldName>,
}

impl HostSnapshot {
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn table(&self, id: &TableId) -> Option<&TableData> {
        self.tables.iter().find(|t| &t.id == id)
    }

    pub(crate) fn table_mut(&mut self, id: &TableId) -> Option<&mut TableData> {
        self.tables.iter_mut().find(|t| &t.id == id)
    }
}

impl TableData {
    pub fn info(&self) -> TableInfo {
        TableInfo {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    pub fn record(&self, id: &RecordId) -> Option<&RecordData> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn record_ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }
}

impl RecordData {
    /// Converts the record to display strings, optionally keeping only
    /// `fields` (an empty slice keeps everything).
    pub fn to_snapshot(&self, fields: &[FieldName]) -> RecordSnapshot {
        let values = self
            .fields
            .iter()
            .filter(|(name, _)| fields.is_empty() || fields.iter().any(|f| f.as_str() == name.as_str()))
            .filter_map(|(name, value)| FieldName::new(name.as_str()).map(|n| (n, display_value(value))))
            .collect();
        RecordSnapshot::new(self.id.clone(), values)
    }
}

/// The text a cell shows: strings as-is, null as empty, everything else as
/// compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_parses_and_keeps_field_order() {
        let json = r#"{
            "currentUser": "usr1",
            "tables": [{
                "id": "tbl1",
                "name": "Orders",
                "records": [{"id": "rec1", "fields": {"zeta": "z", "alpha": 2, "none": null}}]
            }]
        }"#;
        let snapshot = HostSnapshot::from_json(json).unwrap();
        let table = snapshot.table(&TableId::new("tbl1").unwrap()).unwrap();
        let record = table.record(&RecordId::new("rec1").unwrap()).unwrap();

        let converted = record.to_snapshot(&[]);
        let names: Vec<_> = converted.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "none"]);
        assert_eq!(converted.value("alpha"), Some("2"));
        assert_eq!(converted.value("none"), Some(""));
    }

    #[test]
    fn test_field_filter_keeps_only_selected_fields() {
        let mut fields = Map::new();
        fields.insert("a".into(), Value::from("1"));
        fields.insert("b".into(), Value::from("2"));
        let record = RecordData {
            id: RecordId::new("rec1").unwrap(),
            fields,
        };

        let converted = record.to_snapshot(&[FieldName::new("b").unwrap()]);
        assert_eq!(converted.fields.len(), 1);
        assert_eq!(converted.value("b"), Some("2"));
    }

    #[test]
    fn test_malformed_snapshot_is_reported() {
        assert!(matches!(
            HostSnapshot::from_json(r#"{"tables": [{"id": ""}]}"#),
            Err(SnapshotError::Malformed(_))
        ));
    }
}
