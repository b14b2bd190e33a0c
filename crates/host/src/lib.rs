//! In-memory host data adapter.
//!
//! Implements the [`trigger::HostData`] port over a [`HostSnapshot`] held in
//! memory. Used by the CLI (snapshot files) and as the host collaborator in
//! controller tests.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Snapshot parsing and subscription bookkeeping live here.
//! The [`trigger`] crate sees only [`trigger::HostData`].

pub mod memory;
pub mod snapshot;

pub use memory::MemoryHost;
pub use snapshot::{
    display_value, HostSnapshot, RecordData, Selection, SnapshotError, TableData, ViewData,
};
