//! Request body construction for each [`DataSourceMode`].
//!
//! The builder holds the body that will be sent next. It never decides which
//! records belong in the body: the host supplies materialized records (table
//! order, or view filter and order) and the builder only serialises them.

use serde_json::{Map, Value};

use crate::{DataSourceMode, HostData, PayloadError, RecordSnapshot, RecordSource};

/// Holds the pending request body for the configured data source.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    mode: DataSourceMode,
    body: Option<String>,
}

impl PayloadBuilder {
    /// Creates a builder. A manual body is materialized immediately; the other
    /// modes wait for host data.
    pub fn new(mode: DataSourceMode) -> Self {
        let body = match &mode {
            DataSourceMode::Manual(raw) => Some(raw.clone()),
            _ => None,
        };
        Self { mode, body }
    }

    pub fn mode(&self) -> &DataSourceMode {
        &self.mode
    }

    /// Returns `true` once a body is available.
    pub fn is_materialized(&self) -> bool {
        self.body.is_some()
    }

    /// The body as it would be sent now.
    pub fn current(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Replaces the body with `records` (table or view mode).
    pub fn update_records(&mut self, records: &[RecordSnapshot]) -> Result<(), PayloadError> {
        match self.mode {
            DataSourceMode::Table(_) | DataSourceMode::View(_, _) => {
                self.body = Some(records_to_json(records)?);
                Ok(())
            }
            _ => Err(self.mismatch("record")),
        }
    }

    /// Replaces the body with the current cell selection (cells mode). No
    /// selection produces an empty array.
    pub fn update_selection(
        &mut self,
        selection: Option<&[RecordSnapshot]>,
    ) -> Result<(), PayloadError> {
        match self.mode {
            DataSourceMode::Cells => {
                self.body = Some(records_to_json(selection.unwrap_or_default())?);
                Ok(())
            }
            _ => Err(self.mismatch("selection")),
        }
    }

    /// Pulls fresh data from the host for the configured mode. A manual body
    /// is left untouched.
    pub fn rebuild(&mut self, host: &dyn HostData) -> Result<(), PayloadError> {
        match &self.mode {
            DataSourceMode::Manual(_) => Ok(()),
            DataSourceMode::Cells => {
                let selection = host.selected_cells()?;
                self.update_selection(selection.as_deref())
            }
            DataSourceMode::Table(table) => {
                let records = host.records(&RecordSource::Table(table.clone()))?;
                self.update_records(&records)
            }
            DataSourceMode::View(table, view) => {
                let records = host.records(&RecordSource::View(table.clone(), view.clone()))?;
                self.update_records(&records)
            }
        }
    }

    /// Returns the body to send for an invocation starting now.
    ///
    /// Every non-manual body is pulled from the host again, so the send
    /// carries current data even when no change notification arrived (view
    /// filters and sorts are not observable through [`HostData`]).
    pub fn materialize(&mut self, host: &dyn HostData) -> Result<String, PayloadError> {
        self.rebuild(host)?;
        // rebuild() always leaves a body behind for non-manual modes
        Ok(self.body.clone().unwrap_or_default())
    }

    fn mismatch(&self, supplied: &'static str) -> PayloadError {
        PayloadError::ModeMismatch {
            configured: self.mode.kind(),
            supplied,
        }
    }
}

/// Serialises records as a JSON array of `{ field name: display value }`
/// objects, keeping both record order and field order.
pub fn records_to_json(records: &[RecordSnapshot]) -> Result<String, PayloadError> {
    let rows: Vec<Value> = records
        .iter()
        .map(|record| {
            let fields: Map<String, Value> = record
                .fields
                .iter()
                .map(|(name, value)| (name.to_string(), Value::String(value.clone())))
                .collect();
            Value::Object(fields)
        })
        .collect();
    serde_json::to_string(&rows).map_err(|e| PayloadError::Serialization(e.to_string()))
}
