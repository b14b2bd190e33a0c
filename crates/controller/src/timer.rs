//! Owned, cancelable single-shot timers.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Holds at most one pending timer. Scheduling a new one cancels the previous;
/// dropping the slot cancels whatever is pending.
#[derive(Debug)]
pub struct TimerSlot {
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            pending: Mutex::new(None),
        }
    }

    /// Runs `action` after `delay`, replacing any pending timer.
    pub fn schedule<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancels the pending timer, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }

    /// Returns `true` while a scheduled action has not yet run.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
