//! Fetch trigger orchestration.
//!
//! This crate drives one mounted widget: it applies the permission gate,
//! materializes the body, sends the webhook, and owns the loading flag and the
//! timed result message. With auto-rebuild enabled it also watches host
//! records and fires the same trigger once changes have been quiet for a
//! minute.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The controller sequences calls between the domain
//! rules in the [`trigger`] crate and the `HostData` / `WebhookTransport`
//! ports. It contains no domain rules of its own. Timers run on the tokio
//! runtime the controller is mounted in.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`controller`] | `TriggerController` and its observable state |
//! | [`watcher`] | Record change observation across the watch set |
//! | [`debounce`] | Trailing-edge debouncer |
//! | [`timer`] | Owned, cancelable single-shot timers |

pub mod controller;
pub mod debounce;
pub mod timer;
pub mod watcher;

pub use controller::{MountError, TriggerController, TriggerOutcome, TriggerState, DEBOUNCE_WINDOW};
pub use debounce::Debouncer;
pub use timer::TimerSlot;
pub use watcher::{ChangeCallback, ChangeEvent, ChangeWatcher};
