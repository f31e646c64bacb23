//! Connection configuration types.
//!
//! [`EndpointConfig`] says *where* to connect; [`StreamOptions`] says *how* the
//! connection is policed once it is up. Both are plain values handed to
//! `serve` / `connect_duplex`, so two connections with different keepalive or
//! proxy policies can run side by side in one process, and tests never need
//! to touch global state.

use std::time::Duration;

/// Upper bound on the whole establishment: TCP connect, proxy tunnel, TLS and
/// the websocket upgrade.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

/// Largest inbound message (and frame) accepted before the read fails with
/// `MessageTooLarge`.
pub const MAX_MESSAGE_SIZE: usize = 655_350;

/// Default watchdog tick interval and liveness timeout.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Write deadline for a pong reply.
pub const PONG_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on the best-effort close frame sent when the connection is closed
/// locally.
pub const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Where to connect.
///
/// # Example
///
/// ```rust
/// use market_ws::domain::EndpointConfig;
///
/// let cfg = EndpointConfig::new("wss://stream.example.com:9443/ws")
///     .with_proxy("http://127.0.0.1:3128");
/// assert_eq!(cfg.proxy.as_deref(), Some("http://127.0.0.1:3128"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Target websocket URI (`ws://` or `wss://`).
    pub endpoint: String,

    /// Explicit proxy URI. `None` means "resolve from the environment".
    pub proxy: Option<String>,
}

impl EndpointConfig {
    /// Creates a configuration that resolves its proxy from the environment.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            proxy: None,
        }
    }

    /// Routes the connection through an explicit proxy.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// Liveness policing for a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Longest tolerated gap since the last server ping.
    pub timeout: Duration,

    /// How often the watchdog compares the gap against `timeout`.
    pub check_interval: Duration,
}

impl Default for KeepaliveConfig {
    /// | Field          | Default |
    /// |----------------|---------|
    /// | timeout        | 30 s    |
    /// | check_interval | 30 s    |
    fn default() -> Self {
        Self {
            timeout: KEEPALIVE_INTERVAL,
            check_interval: KEEPALIVE_INTERVAL,
        }
    }
}

/// Proxy-related environment variables, captured as a value.
///
/// Passing a `ProxyEnv` in [`StreamOptions::proxy_env`] lets tests (or
/// embedders with their own settings source) decide proxying without
/// mutating the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyEnv {
    /// Proxy for `ws://` targets.
    pub http_proxy: Option<String>,
    /// Proxy for `wss://` targets.
    pub https_proxy: Option<String>,
    /// Comma-separated bypass list.
    pub no_proxy: Option<String>,
}

impl ProxyEnv {
    /// Reads `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY` (or their lower-case
    /// spellings) from the process environment. Upper case wins; empty values
    /// count as unset.
    pub fn from_process() -> Self {
        Self {
            http_proxy: env_var(&["HTTP_PROXY", "http_proxy"]),
            https_proxy: env_var(&["HTTPS_PROXY", "https_proxy"]),
            no_proxy: env_var(&["NO_PROXY", "no_proxy"]),
        }
    }
}

fn env_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Per-connection lifecycle policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// `Some` installs the liveness watchdog; `None` leaves dead-peer
    /// detection to the transport.
    pub keepalive: Option<KeepaliveConfig>,

    /// `None` reads the proxy variables from the process at dial time.
    pub proxy_env: Option<ProxyEnv>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            keepalive: Some(KeepaliveConfig::default()),
            proxy_env: None,
        }
    }
}

impl StreamOptions {
    /// Disables the liveness watchdog.
    pub fn without_keepalive(mut self) -> Self {
        self.keepalive = None;
        self
    }

    /// Replaces the keepalive policy.
    pub fn with_keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = Some(keepalive);
        self
    }

    /// Resolves environment proxies from `env` instead of the process.
    pub fn with_proxy_env(mut self, env: ProxyEnv) -> Self {
        self.proxy_env = Some(env);
        self
    }
}

/// Payload compression requested during the handshake.
///
/// tokio-tungstenite has no permessage-deflate support, so `Enabled` is only
/// logged and every connection currently runs uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Used by the managed lifecycle.
    Enabled,
    /// Used by the raw duplex accessor.
    Disabled,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
