//! Keepalive: answering server pings and noticing when they stop.
//!
//! Market-data servers ping on a fixed schedule and drop clients that do not
//! answer. The reverse also matters: a server that silently vanished (NAT
//! timeout, half-open TCP) leaves the read loop blocked forever unless
//! something notices that the pings stopped.
//!
//! - [`PingResponder`] echoes every ping as a pong under a short write
//!   deadline and, when keepalive is enabled, records the time in a
//!   [`Liveness`] stamp.
//! - [`spawn_watchdog`] wakes every `check_interval` and closes the connection
//!   once the stamp is older than `timeout`. Closing makes the read loop fail,
//!   and that failure is reported like any other unexpected error.
//!
//! The watchdog also exits when the read loop finishes for any other reason,
//! so its ticker never outlives the connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, trace, warn};

use crate::application::signal::Signal;
use crate::application::transport::FrameControl;
use crate::domain::{KeepaliveConfig, StreamError, PONG_WRITE_TIMEOUT};

/// Floor for the watchdog tick; tokio intervals cannot have a zero period.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Time of the last answered ping, on the tokio clock.
///
/// Written by the read loop's ping responder, read by the watchdog.
#[derive(Debug)]
pub struct Liveness {
    origin: Instant,
    last_nanos: AtomicU64,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Starts the clock at "a ping was just seen".
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_nanos: AtomicU64::new(0),
        }
    }

    /// Records a ping at the current instant.
    pub fn touch(&self) {
        let nanos = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last_nanos.store(nanos, Ordering::Release);
    }

    /// Time elapsed since the last recorded ping.
    pub fn since_last(&self) -> Duration {
        let last = Duration::from_nanos(self.last_nanos.load(Ordering::Acquire));
        self.origin.elapsed().saturating_sub(last)
    }
}

/// Answers server pings on behalf of the read loop.
pub struct PingResponder {
    control: Arc<dyn FrameControl>,
    liveness: Option<Arc<Liveness>>,
    deadline: Duration,
}

impl PingResponder {
    /// `liveness` is `Some` only when keepalive is enabled.
    pub fn new(control: Arc<dyn FrameControl>, liveness: Option<Arc<Liveness>>) -> Self {
        Self {
            control,
            liveness,
            deadline: PONG_WRITE_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Echoes `payload` in a pong, then refreshes the liveness stamp.
    ///
    /// # Errors
    ///
    /// Returns the write failure, or [`StreamError::PongWriteTimeout`] when the
    /// deadline passes first. The read loop treats either as its terminal
    /// read error.
    pub async fn on_ping(&self, payload: Vec<u8>) -> Result<(), StreamError> {
        let len = payload.len();
        match timeout(self.deadline, self.control.write_pong(payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(StreamError::PongWriteTimeout {
                    timeout: self.deadline,
                })
            }
        }

        if let Some(liveness) = &self.liveness {
            liveness.touch();
        }
        debug!("answered ping ({len} bytes)");
        Ok(())
    }
}

/// Spawns the liveness watchdog.
///
/// The first check happens one `check_interval` after the call. The task ends
/// after it closes the connection, or as soon as `done` fires. A
/// `check_interval` below 10 ms is raised to 10 ms.
pub fn spawn_watchdog(
    control: Arc<dyn FrameControl>,
    liveness: Arc<Liveness>,
    config: KeepaliveConfig,
    done: Signal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = config.check_interval.max(MIN_CHECK_INTERVAL);
        let mut ticker = interval_at(Instant::now() + period, period);
        let finished = done.wait();
        tokio::pin!(finished);

        loop {
            tokio::select! {
                _ = &mut finished => {
                    trace!("watchdog: read loop finished, stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let silent_for = liveness.since_last();
                    if silent_for > config.timeout {
                        warn!(
                            "no ping for {silent_for:?} (limit {:?}); closing connection",
                            config.timeout
                        );
                        control.close().await;
                        return;
                    }
                    trace!("watchdog: last ping {silent_for:?} ago");
                }
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transport::MockFrameControl;
    use crate::infrastructure::mock::ScriptedTransport;
    use tokio_tungstenite::tungstenite::Error as WsError;

    fn keepalive(secs: u64) -> KeepaliveConfig {
        KeepaliveConfig {
            timeout: Duration::from_secs(secs),
            check_interval: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_tracks_elapsed_time() {
        let liveness = Liveness::new();
        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(liveness.since_last(), Duration::from_secs(7));

        liveness.touch();
        assert_eq!(liveness.since_last(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_responder_echoes_payload_and_touches_liveness() {
        let transport = ScriptedTransport::new();
        let liveness = Arc::new(Liveness::new());
        let responder = PingResponder::new(transport.control(), Some(Arc::clone(&liveness)));

        tokio_test::assert_ok!(responder.on_ping(b"hb-1".to_vec()).await);

        assert_eq!(transport.pongs(), vec![b"hb-1".to_vec()]);
        assert!(liveness.since_last() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_responder_propagates_write_failure() {
        let mut control = MockFrameControl::new();
        control.expect_write_pong().times(1).returning(|_| {
            Err(StreamError::PongWrite(WsError::AlreadyClosed))
        });
        control.expect_close().never();

        let liveness = Arc::new(Liveness::new());
        let responder = PingResponder::new(Arc::new(control), Some(Arc::clone(&liveness)));

        let result = responder.on_ping(vec![1, 2, 3]).await;
        assert!(matches!(result, Err(StreamError::PongWrite(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_times_out_on_stalled_write() {
        let transport = ScriptedTransport::new();
        transport.stall_pongs();
        let responder = PingResponder::new(transport.control(), None)
            .with_deadline(Duration::from_millis(250));

        let result = responder.on_ping(b"x".to_vec()).await;
        assert!(matches!(result, Err(StreamError::PongWriteTimeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_closes_silent_connection() {
        let transport = ScriptedTransport::new();
        let done = Signal::new();
        let handle = spawn_watchdog(
            transport.control(),
            Arc::new(Liveness::new()),
            keepalive(30),
            done.clone(),
        );

        // First tick at 30s sees exactly 30s of silence: not yet "more than".
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(transport.close_calls(), 0);

        // Second tick at 60s closes.
        tokio::time::sleep(Duration::from_secs(30)).await;
        handle.await.unwrap();
        assert_eq!(transport.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_tolerates_steady_pings() {
        let transport = ScriptedTransport::new();
        let liveness = Arc::new(Liveness::new());
        let done = Signal::new();
        let handle = spawn_watchdog(
            transport.control(),
            Arc::clone(&liveness),
            keepalive(30),
            done.clone(),
        );

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            liveness.touch();
        }
        assert_eq!(transport.close_calls(), 0);
        assert!(!handle.is_finished());

        done.fire();
        handle.await.unwrap();
        assert_eq!(transport.close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_with_zero_interval_still_closes() {
        let transport = ScriptedTransport::new();
        let config = KeepaliveConfig {
            timeout: Duration::from_secs(1),
            check_interval: Duration::ZERO,
        };
        let handle = spawn_watchdog(
            transport.control(),
            Arc::new(Liveness::new()),
            config,
            Signal::new(),
        );

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watchdog must close the silent connection")
            .unwrap();
        assert_eq!(transport.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_exits_when_read_loop_finishes() {
        let transport = ScriptedTransport::new();
        let done = Signal::new();
        let handle = spawn_watchdog(
            transport.control(),
            Arc::new(Liveness::new()),
            keepalive(30),
            done.clone(),
        );

        done.fire();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watchdog must stop promptly")
            .unwrap();
        assert_eq!(transport.close_calls(), 0);
    }
}
