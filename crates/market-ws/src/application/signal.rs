//! One-shot broadcast signals.
//!
//! A [`Signal`] starts unfired and can be fired exactly once; every later
//! `fire()` is a no-op that returns `false`. Any number of tasks can `wait()`
//! on it, before or after it fires.
//!
//! Two public views restrict who may do what:
//!
//! - [`DoneSignal`]: the caller may only wait on it. The read loop completes it.
//! - [`StopHandle`]: the caller may only fire it. The shutdown observer waits.

use std::sync::Arc;

use tokio::sync::watch;

/// A fire-once, wait-many notification.
#[derive(Debug, Clone)]
pub struct Signal {
    state: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    /// Creates an unfired signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Fires the signal. Returns `true` only for the call that performed the
    /// transition.
    pub fn fire(&self) -> bool {
        self.state.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the signal has fired.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed
        // channel.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

/// Fires the wrapped signal when dropped.
pub struct FireOnDrop(pub Signal);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}

/// Completes when the read loop has permanently stopped.
#[derive(Debug, Clone)]
pub struct DoneSignal(Signal);

impl DoneSignal {
    pub(crate) fn new(signal: Signal) -> Self {
        Self(signal)
    }

    /// Whether the read loop has exited.
    pub fn is_done(&self) -> bool {
        self.0.is_fired()
    }

    /// Waits for the read loop to exit.
    pub async fn wait(&self) {
        self.0.wait().await;
    }
}

/// Requests an intentional shutdown. Errors caused by that shutdown are not
/// reported to the error handler.
#[derive(Debug, Clone)]
pub struct StopHandle(Signal);

impl StopHandle {
    pub(crate) fn new(signal: Signal) -> Self {
        Self(signal)
    }

    /// Asks the connection to shut down. Calling it again is harmless.
    pub fn stop(&self) {
        if self.0.fire() {
            tracing::debug!("stop requested");
        }
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.0.is_fired()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_second_fire_is_a_no_op() {
        let signal = Signal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns_immediately() {
        let signal = Signal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("wait must resolve for an already-fired signal");
    }

    #[tokio::test]
    async fn test_all_waiters_wake() {
        let signal = Signal::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let s = signal.clone();
                tokio::spawn(async move { s.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        signal.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter timed out")
                .unwrap();
        }
    }

    #[test]
    fn test_fire_on_drop_fires_once() {
        let signal = Signal::new();
        {
            let _guard = FireOnDrop(signal.clone());
            assert!(!signal.is_fired());
        }
        assert!(signal.is_fired());
        // A second guard over the same signal does not panic or re-fire.
        drop(FireOnDrop(signal.clone()));
        assert!(signal.is_fired());
    }

    #[test]
    fn test_fire_on_drop_fires_during_unwind() {
        let signal = Signal::new();
        let guarded = signal.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = FireOnDrop(guarded);
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert!(signal.is_fired());
    }

    #[test]
    fn test_stop_handle_is_idempotent() {
        let signal = Signal::new();
        let stop = StopHandle::new(signal.clone());
        stop.stop();
        stop.stop();
        assert!(stop.is_stopped());
        assert!(signal.is_fired());
    }

    #[test]
    fn test_done_signal_reflects_source() {
        let signal = Signal::new();
        let done = DoneSignal::new(signal.clone());
        assert!(!done.is_done());
        signal.fire();
        assert!(done.is_done());
    }
}
