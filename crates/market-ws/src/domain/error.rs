//! Error kinds produced while establishing or running a connection.
//!
//! Two families share one enum:
//!
//! - **Setup errors** (`InvalidProxyUrl`, `InvalidEndpoint`, `Connect`,
//!   `ProxyTunnel`, `Handshake`, `HandshakeTimeout`) are returned directly
//!   from `serve` / `connect_duplex`. They never reach the error handler.
//! - **Runtime errors** (everything else) end the read loop and are delivered
//!   to the caller's error handler at most once, unless the caller asked for
//!   the shutdown that caused them.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::{error::CapacityError, Error as WsError};

/// Errors surfaced by a market-data connection.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The explicit (or environment) proxy could not be used. Raised before
    /// any network I/O.
    #[error("invalid proxy URL '{proxy}': {reason}")]
    InvalidProxyUrl { proxy: String, reason: String },

    /// The target is not a usable `ws://` / `wss://` URI.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// TCP connection to the target (or to the proxy) failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The proxy refused or botched the tunnel.
    #[error("proxy tunnel through {proxy} failed: {reason}")]
    ProxyTunnel { proxy: String, reason: String },

    /// The TLS or websocket upgrade failed.
    #[error("websocket handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: WsError,
    },

    /// Establishment did not finish within the handshake timeout.
    #[error("websocket handshake with {endpoint} timed out after {timeout:?}")]
    HandshakeTimeout { endpoint: String, timeout: Duration },

    /// An inbound message exceeded the read limit.
    #[error("message of {size} bytes exceeds the {max_size} byte limit")]
    MessageTooLarge { size: usize, max_size: usize },

    /// The peer closed the connection (close frame or end of stream).
    #[error("connection closed by peer (code {code:?}): {reason}")]
    ConnectionClosed { code: Option<u16>, reason: String },

    /// A read was attempted after this side closed the connection. This is
    /// what a stop request or a watchdog closure looks like to the read loop.
    #[error("use of closed connection")]
    LocallyClosed,

    /// Any other transport failure while reading.
    #[error("websocket read failed: {0}")]
    Read(#[source] WsError),

    /// The pong reply could not be written.
    #[error("pong write failed: {0}")]
    PongWrite(#[source] WsError),

    /// The pong reply did not go out before its deadline.
    #[error("pong write timed out after {timeout:?}")]
    PongWriteTimeout { timeout: Duration },
}

impl StreamError {
    /// Maps a tungstenite read failure onto the runtime error kinds.
    pub fn from_read(err: WsError) -> Self {
        match err {
            WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
                Self::MessageTooLarge { size, max_size }
            }
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::ConnectionClosed {
                code: None,
                reason: err.to_string(),
            },
            other => Self::Read(other),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
