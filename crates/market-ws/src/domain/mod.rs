//! Domain layer for market-ws.
//!
//! Pure types shared by the other layers: how to reach an endpoint, which
//! lifecycle policies apply to a connection, the timing constants, and the
//! error kinds a connection can produce.
//!
//! Nothing in here performs I/O. Reading the process environment is the one
//! exception, and it only happens when a caller explicitly asks for
//! [`ProxyEnv::from_process`].

pub mod config;
pub mod error;
pub mod settings;

pub use config::{
    Compression, EndpointConfig, KeepaliveConfig, ProxyEnv, StreamOptions, CLOSE_WRITE_TIMEOUT,
    HANDSHAKE_TIMEOUT, KEEPALIVE_INTERVAL, MAX_MESSAGE_SIZE, PONG_WRITE_TIMEOUT,
};
pub use error::StreamError;
pub use settings::{Settings, SettingsError};
