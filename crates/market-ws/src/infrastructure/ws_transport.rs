//! tokio-tungstenite adapter for the transport seam.
//!
//! The websocket is split into a read stream and a write sink. The read half
//! becomes the [`FrameReader`]; the sink sits behind a `tokio::sync::Mutex`
//! inside the [`FrameControl`], so pong replies and the close frame never
//! interleave on the wire.
//!
//! # Closing
//!
//! Closing fires a local signal first, which the reader selects on with
//! priority. A pending `next_frame` therefore fails immediately with
//! `LocallyClosed`, without waiting for the peer to answer the close frame.
//! The close frame itself is best-effort and bounded by
//! [`CLOSE_WRITE_TIMEOUT`].
//!
//! # Pongs
//!
//! tungstenite queues an automatic pong for every ping it reads. Writing our
//! own pong replaces that queued one instead of adding a second, so exactly
//! one pong per ping goes out, and it goes out under our deadline.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use crate::application::signal::Signal;
use crate::application::transport::{Connection, Frame, FrameControl, FrameReader};
use crate::domain::{StreamError, CLOSE_WRITE_TIMEOUT};
use crate::infrastructure::dialer::WsStream;

/// Splits an established websocket into a lifecycle [`Connection`].
pub fn into_connection(ws: WsStream) -> Connection {
    let (sink, stream) = ws.split();
    let closed = Signal::new();

    let reader = WsReader {
        stream,
        closed: closed.clone(),
    };
    let control = WsControl {
        sink: Mutex::new(sink),
        closed,
    };
    Connection::new(Box::new(reader), Arc::new(control))
}

struct WsReader {
    stream: SplitStream<WsStream>,
    closed: Signal,
}

struct WsControl {
    sink: Mutex<SplitSink<WsStream, Message>>,
    closed: Signal,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn next_frame(&mut self) -> Result<Frame, StreamError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.closed.wait() => return Err(StreamError::LocallyClosed),
                next = self.stream.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(StreamError::from_read(e)),
                None => {
                    return Err(StreamError::ConnectionClosed {
                        code: None,
                        reason: "stream ended".to_string(),
                    })
                }
            };

            match message {
                Message::Text(text) => return Ok(Frame::Data(text.into_bytes())),
                Message::Binary(data) => return Ok(Frame::Data(data)),
                Message::Ping(payload) => return Ok(Frame::Ping(payload)),
                Message::Pong(_) => trace!("unsolicited pong ignored"),
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return Err(StreamError::ConnectionClosed { code, reason });
                }
                Message::Frame(_) => trace!("raw frame ignored"),
            }
        }
    }
}

#[async_trait]
impl FrameControl for WsControl {
    async fn write_pong(&self, payload: Vec<u8>) -> Result<(), StreamError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Pong(payload))
            .await
            .map_err(StreamError::PongWrite)
    }

    async fn close(&self) {
        if !self.closed.fire() {
            return;
        }
        debug!("closing websocket");

        let mut sink = self.sink.lock().await;
        match timeout(CLOSE_WRITE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("close frame not delivered: {e}"),
            Err(_) => debug!("close frame timed out after {CLOSE_WRITE_TIMEOUT:?}"),
        }
    }
}
