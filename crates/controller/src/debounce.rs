//! Trailing-edge debouncing.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::trace;

use crate::timer::TimerSlot;

/// Collapses bursts of calls into one action, fired once the calls have been
/// quiet for `window`.
pub struct Debouncer {
    window: Duration,
    action: Arc<dyn Fn() + Send + Sync>,
    slot: TimerSlot,
}

impl Debouncer {
    pub fn new(runtime: Handle, window: Duration, action: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            window,
            action,
            slot: TimerSlot::new(runtime),
        }
    }

    /// Records a call, pushing the pending action back by a full window.
    pub fn call(&self) {
        trace!(window_ms = self.window.as_millis() as u64, "Debounce window restarted");
        let action = self.action.clone();
        self.slot.schedule(self.window, move || action());
    }

    /// Drops the pending action without running it.
    pub fn cancel(&self) {
        self.slot.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_pending()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(window: Duration) -> (Debouncer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let debouncer = Debouncer::new(
            Handle::current(),
            window,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (debouncer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_after_quiet_window() {
        let (debouncer, fired) = counting(Duration::from_secs(60));

        debouncer.call();
        tokio::time::sleep(Duration::from_secs(10)).await;
        debouncer.call();
        tokio::time::sleep(Duration::from_secs(10)).await;
        debouncer.call();

        // 59 s after the last call: still waiting
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (debouncer, fired) = counting(Duration::from_secs(1));

        debouncer.call();
        tokio::time::sleep(Duration::from_secs(2)).await;
        debouncer.call();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_call() {
        let (debouncer, fired) = counting(Duration::from_secs(1));

        debouncer.call();
        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
