//! Infrastructure layer for market-ws.
//!
//! Everything that touches the network:
//!
//! - **`proxy`** – explicit / environment proxy selection, HTTP `CONNECT` and
//!   SOCKS5 tunnels.
//! - **`dialer`** – TCP + TLS + websocket upgrade under the handshake timeout,
//!   with the inbound size limit applied.
//! - **`ws_transport`** – adapts a tokio-tungstenite stream to the
//!   `FrameReader` / `FrameControl` seam.
//! - **`serve`** – the public entry points.
//! - **`mock`** – a scripted in-memory transport for tests.

pub mod dialer;
pub mod mock;
pub mod proxy;
pub mod serve;
pub mod ws_transport;

pub use dialer::WsStream;
pub use serve::{connect_duplex, serve};
