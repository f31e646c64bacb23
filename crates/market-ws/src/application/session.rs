//! Connection lifecycle: read loop plus shutdown coordination.
//!
//! [`run_connection`] takes an established [`Connection`] and starts up to
//! three tasks over it:
//!
//! 1. **Shutdown observer** waits for whichever comes first, a stop request
//!    or the read loop's exit. On a stop request it raises the silence flag.
//!    Either way it then closes the connection.
//! 2. **Watchdog** (only when keepalive is enabled), see
//!    [`keepalive`](crate::application::keepalive).
//! 3. **Read loop** receives frames one at a time, answers pings, calls the
//!    message handler for data, and on the first error reports it (unless
//!    the silence flag is up) and exits.
//!
//! ```text
//!            Running ──stop requested──▶ Closing (silent) ──▶ Closed
//!               │                                               ▲
//!               └──read error / peer close / watchdog──▶ Closing (reported)
//! ```
//!
//! The completion signal is fired by a drop guard inside the read loop, so it
//! fires exactly once on every exit path, including a panicking handler.
//!
//! # Handler contract
//!
//! The message handler runs on the read loop's task. While it runs nothing
//! else is received, and closing the connection cannot interrupt it. Keep it
//! short; hand heavy work to another task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::application::keepalive::{spawn_watchdog, Liveness, PingResponder};
use crate::application::signal::{DoneSignal, FireOnDrop, Signal, StopHandle};
use crate::application::transport::{Connection, Frame, FrameReader};
use crate::domain::{KeepaliveConfig, StreamError};

/// Starts the lifecycle tasks over `connection`.
///
/// Returns the completion signal and the stop handle. `handler` receives
/// every data message in arrival order; `on_error` is called at most once,
/// with the error that ended the read loop, unless the caller requested the
/// shutdown.
///
/// Must be called from within a tokio runtime.
pub fn run_connection<H, E>(
    connection: Connection,
    keepalive: Option<KeepaliveConfig>,
    handler: H,
    on_error: E,
) -> (DoneSignal, StopHandle)
where
    H: FnMut(Vec<u8>) + Send + 'static,
    E: FnOnce(StreamError) + Send + 'static,
{
    let Connection { reader, control } = connection;
    let done = Signal::new();
    let stop = Signal::new();
    let silent = Arc::new(AtomicBool::new(false));

    // Shutdown observer: the primary closer.
    {
        let (done, stop, silent) = (done.clone(), stop.clone(), Arc::clone(&silent));
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.wait() => {
                    silent.store(true, Ordering::Release);
                    debug!("stop requested; closing connection silently");
                }
                _ = done.wait() => {
                    debug!("read loop exited; closing connection");
                }
            }
            control.close().await;
        });
    }

    let liveness = keepalive.map(|config| {
        let liveness = Arc::new(Liveness::new());
        spawn_watchdog(
            Arc::clone(&control),
            Arc::clone(&liveness),
            config,
            done.clone(),
        );
        liveness
    });

    let responder = PingResponder::new(control, liveness);
    let read_loop = ReadLoop {
        reader,
        responder,
        silent,
        done: done.clone(),
    };
    tokio::spawn(read_loop.run(handler, on_error));

    (DoneSignal::new(done), StopHandle::new(stop))
}

struct ReadLoop {
    reader: Box<dyn FrameReader>,
    responder: PingResponder,
    silent: Arc<AtomicBool>,
    done: Signal,
}

impl ReadLoop {
    async fn run<H, E>(mut self, mut handler: H, on_error: E)
    where
        H: FnMut(Vec<u8>),
        E: FnOnce(StreamError),
    {
        let _done = FireOnDrop(self.done.clone());

        let err = loop {
            match self.reader.next_frame().await {
                Ok(Frame::Data(payload)) => {
                    trace!("message ({} bytes)", payload.len());
                    handler(payload);
                }
                Ok(Frame::Ping(payload)) => {
                    if let Err(e) = self.responder.on_ping(payload).await {
                        break e;
                    }
                }
                Err(e) => break e,
            }
        };

        if self.silent.load(Ordering::Acquire) {
            debug!("read loop stopped after requested shutdown: {err}");
        } else {
            warn!("read loop failed: {err}");
            on_error(err);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
