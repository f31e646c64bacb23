//! In-memory transport for exercising the lifecycle without a network.
//!
//! [`ScriptedTransport`] hands out one [`Connection`] whose reader yields
//! whatever the test pushes (`push_data`, `push_ping`, `push_error`) and whose
//! control half records every pong and close call. It honours the transport
//! contract: once closed, a pending or future `next_frame` fails with
//! [`StreamError::LocallyClosed`].
//!
//! ```ignore
//! let transport = ScriptedTransport::new();
//! transport.push_ping(b"hb".to_vec());
//! let (done, stop) = run_connection(transport.connection(), None, |_| {}, |_| {});
//!
//! // ...
//! assert_eq!(transport.pongs(), vec![b"hb".to_vec()]);
//! ```
//!
//! `fail_pongs()` and `stall_pongs()` switch the pong writer into failure
//! modes so the error paths can be driven deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::application::signal::Signal;
use crate::application::transport::{Connection, Frame, FrameControl, FrameReader};
use crate::domain::StreamError;

type Script = Result<Frame, StreamError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PongMode {
    Ok,
    Fail,
    Stall,
}

/// A scripted, recording connection.
pub struct ScriptedTransport {
    tx: mpsc::UnboundedSender<Script>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Script>>>,
    control: Arc<ScriptedControl>,
}

struct ScriptedControl {
    closed: Signal,
    close_calls: AtomicUsize,
    pongs: Mutex<Vec<Vec<u8>>>,
    mode: Mutex<PongMode>,
}

struct ScriptedReader {
    rx: mpsc::UnboundedReceiver<Script>,
    closed: Signal,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            control: Arc::new(ScriptedControl {
                closed: Signal::new(),
                close_calls: AtomicUsize::new(0),
                pongs: Mutex::new(Vec::new()),
                mode: Mutex::new(PongMode::Ok),
            }),
        }
    }

    /// Takes the connection. May be called once.
    pub fn connection(&self) -> Connection {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("ScriptedTransport::connection called twice");
        let reader = ScriptedReader {
            rx,
            closed: self.control.closed.clone(),
        };
        Connection::new(Box::new(reader), self.control())
    }

    /// The shared control half on its own.
    pub fn control(&self) -> Arc<dyn FrameControl> {
        Arc::clone(&self.control) as Arc<dyn FrameControl>
    }

    pub fn push_data(&self, payload: Vec<u8>) {
        let _ = self.tx.send(Ok(Frame::Data(payload)));
    }

    pub fn push_ping(&self, payload: Vec<u8>) {
        let _ = self.tx.send(Ok(Frame::Ping(payload)));
    }

    pub fn push_error(&self, err: StreamError) {
        let _ = self.tx.send(Err(err));
    }

    /// Every pong payload written so far, in order.
    pub fn pongs(&self) -> Vec<Vec<u8>> {
        self.control.pongs.lock().unwrap().clone()
    }

    /// Number of `close()` calls, including redundant ones.
    pub fn close_calls(&self) -> usize {
        self.control.close_calls.load(Ordering::SeqCst)
    }

    /// Makes every later pong write fail.
    pub fn fail_pongs(&self) {
        *self.control.mode.lock().unwrap() = PongMode::Fail;
    }

    /// Makes every later pong write hang forever.
    pub fn stall_pongs(&self) {
        *self.control.mode.lock().unwrap() = PongMode::Stall;
    }
}

#[async_trait]
impl FrameReader for ScriptedReader {
    async fn next_frame(&mut self) -> Result<Frame, StreamError> {
        tokio::select! {
            biased;
            _ = self.closed.wait() => Err(StreamError::LocallyClosed),
            next = self.rx.recv() => next.unwrap_or(Err(StreamError::ConnectionClosed {
                code: None,
                reason: "script exhausted".to_string(),
            })),
        }
    }
}

#[async_trait]
impl FrameControl for ScriptedControl {
    async fn write_pong(&self, payload: Vec<u8>) -> Result<(), StreamError> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            PongMode::Ok => {
                self.pongs.lock().unwrap().push(payload);
                Ok(())
            }
            PongMode::Fail => Err(StreamError::PongWrite(WsError::AlreadyClosed)),
            PongMode::Stall => std::future::pending().await,
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.fire();
    }
}
