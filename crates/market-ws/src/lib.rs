//! market-ws library crate.
//!
//! Maintains one websocket connection to a market-data endpoint, hands every
//! inbound message to a caller-supplied handler, answers server pings, polices
//! liveness, and shuts down cleanly when the caller asks it to.
//!
//! # Architecture
//!
//! ```text
//! caller ── serve() ──────────────────────────────┐
//!                                                 ▼
//! [market-ws]
//!   ├── domain/          EndpointConfig, StreamOptions, StreamError, Settings
//!   ├── application/     signals, transport seam, keepalive, read loop + shutdown
//!   └── infrastructure/
//!         ├── proxy/        explicit / environment proxy, CONNECT + SOCKS5 tunnels
//!         ├── dialer/       handshake with timeout and read limit
//!         ├── ws_transport/ tokio-tungstenite adapter for the transport seam
//!         └── serve/        managed lifecycle and the raw duplex accessor
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and on the transport traits it owns; it
//!   never names tokio-tungstenite, so the whole lifecycle can be exercised
//!   against the in-memory transport in `infrastructure::mock`.
//! - `infrastructure` depends on everything else plus tokio-tungstenite.
//!
//! # Example
//!
//! ```no_run
//! use market_ws::domain::{EndpointConfig, StreamOptions};
//! use market_ws::infrastructure::serve;
//!
//! # async fn example() -> Result<(), market_ws::domain::StreamError> {
//! let endpoint = EndpointConfig::new("wss://stream.example.com:9443/ws/btcusdt@trade");
//! let (done, stop) = serve(
//!     &endpoint,
//!     &StreamOptions::default(),
//!     |msg| println!("{}", String::from_utf8_lossy(&msg)),
//!     |err| eprintln!("stream failed: {err}"),
//! )
//! .await?;
//!
//! // ... later
//! stop.stop();
//! done.wait().await;
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration, constants and error types (no I/O).
pub mod domain;

/// Application layer: the transport-agnostic connection lifecycle.
pub mod application;

/// Infrastructure layer: proxying, dialing and the websocket adapter.
pub mod infrastructure;
