//! The seam between the connection lifecycle and the websocket library.
//!
//! A live connection is split in two:
//!
//! - a [`FrameReader`], owned exclusively by the read loop, and
//! - a [`FrameControl`], shared by the read loop (pong replies), the shutdown
//!   observer and the watchdog (closing).
//!
//! Implementations must allow `write_pong` and `close` while a `next_frame`
//! call is pending, and `close` must make that pending call (and every later
//! one) fail promptly with [`StreamError::LocallyClosed`]. The tokio-tungstenite
//! adapter serialises its writes behind an async mutex to satisfy this.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::StreamError;

/// What the read loop acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An application message (text or binary), as raw bytes.
    Data(Vec<u8>),
    /// A server ping carrying this payload.
    Ping(Vec<u8>),
}

/// Receiving half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Waits for the next frame. Pong and other control noise is consumed
    /// internally; a peer close surfaces as `ConnectionClosed`.
    async fn next_frame(&mut self) -> Result<Frame, StreamError>;
}

/// Shared control half of a connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameControl: Send + Sync {
    /// Writes a pong echoing `payload`. The caller bounds it with a deadline.
    async fn write_pong(&self, payload: Vec<u8>) -> Result<(), StreamError>;

    /// Closes the connection. Safe to call any number of times from any task.
    async fn close(&self);
}

/// An established connection, ready to be handed to the lifecycle.
pub struct Connection {
    pub reader: Box<dyn FrameReader>,
    pub control: Arc<dyn FrameControl>,
}

impl Connection {
    pub fn new(reader: Box<dyn FrameReader>, control: Arc<dyn FrameControl>) -> Self {
        Self { reader, control }
    }
}
