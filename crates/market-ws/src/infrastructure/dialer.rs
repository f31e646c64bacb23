//! Websocket establishment.
//!
//! [`dial`] turns an [`EndpointConfig`] into an open websocket:
//!
//! 1. Parse the target (`ws://` or `wss://`).
//! 2. Pick a proxy (see [`proxy`](crate::infrastructure::proxy)). A bad
//!    proxy string fails here, before any I/O.
//! 3. Within [`HANDSHAKE_TIMEOUT`]: open TCP (directly or through the proxy
//!    tunnel), then run TLS and the websocket upgrade over it.
//!
//! With a read limit (the managed lifecycle passes
//! [`MAX_MESSAGE_SIZE`](crate::domain::MAX_MESSAGE_SIZE)) the
//! stream refuses larger inbound messages and frames, and such a read fails
//! with `MessageTooLarge`. Without one, tungstenite's own defaults apply.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{client_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use crate::domain::{
    Compression, EndpointConfig, ProxyEnv, StreamError, StreamOptions, HANDSHAKE_TIMEOUT,
};
use crate::infrastructure::proxy::{bare_host, open_tunnel, resolve_proxy};

/// An established client websocket.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Establishes a websocket to `endpoint`.
///
/// # Errors
///
/// Only setup errors: `InvalidEndpoint`, `InvalidProxyUrl`, `Connect`,
/// `ProxyTunnel`, `Handshake` and `HandshakeTimeout`.
pub async fn dial(
    endpoint: &EndpointConfig,
    options: &StreamOptions,
    compression: Compression,
    read_limit: Option<usize>,
) -> Result<WsStream, StreamError> {
    dial_within(endpoint, options, compression, read_limit, HANDSHAKE_TIMEOUT).await
}

pub(crate) async fn dial_within(
    endpoint: &EndpointConfig,
    options: &StreamOptions,
    compression: Compression,
    read_limit: Option<usize>,
    limit: Duration,
) -> Result<WsStream, StreamError> {
    let target = parse_endpoint(&endpoint.endpoint)?;
    let env = options
        .proxy_env
        .clone()
        .unwrap_or_else(ProxyEnv::from_process);
    let proxy = resolve_proxy(&target, endpoint.proxy.as_deref(), &env)?;

    let host = target
        .host()
        .map(|h| bare_host(&h))
        .ok_or_else(|| invalid_endpoint(&endpoint.endpoint, "missing host"))?;
    let port = target
        .port_or_known_default()
        .ok_or_else(|| invalid_endpoint(&endpoint.endpoint, "missing port"))?;

    match &proxy {
        Some(p) => info!(
            "dialing {} via {} proxy {}:{}",
            endpoint.endpoint,
            p.scheme(),
            p.host_str().unwrap_or_default(),
            p.port_or_known_default().unwrap_or_default()
        ),
        None => info!("dialing {}", endpoint.endpoint),
    }
    if compression == Compression::Enabled {
        // tungstenite has no permessage-deflate; the upgrade goes out without
        // the extension header and the server falls back to plain frames.
        debug!("payload compression requested; continuing uncompressed");
    }

    let establish = async {
        let tcp = match &proxy {
            Some(proxy) => open_tunnel(proxy, &host, port).await?,
            None => TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|source| StreamError::Connect {
                    addr: format!("{host}:{port}"),
                    source,
                })?,
        };
        if let Err(e) = tcp.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }

        install_crypto_provider();
        let request = target
            .as_str()
            .into_client_request()
            .map_err(|source| StreamError::Handshake {
                endpoint: endpoint.endpoint.clone(),
                source,
            })?;
        let (ws, response) =
            client_async_tls_with_config(request, tcp, read_limit.map(read_limits), None)
                .await
                .map_err(|source| StreamError::Handshake {
                    endpoint: endpoint.endpoint.clone(),
                    source,
                })?;
        debug!("upgrade answered with {}", response.status());
        Ok::<WsStream, StreamError>(ws)
    };

    match timeout(limit, establish).await {
        Ok(result) => result,
        Err(_) => Err(StreamError::HandshakeTimeout {
            endpoint: endpoint.endpoint.clone(),
            timeout: limit,
        }),
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, StreamError> {
    let url = Url::parse(raw).map_err(|e| invalid_endpoint(raw, &e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(invalid_endpoint(
            raw,
            &format!("unsupported scheme '{other}', expected ws or wss"),
        )),
    }
}

fn invalid_endpoint(raw: &str, reason: &str) -> StreamError {
    StreamError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn read_limits(max_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_size);
    config.max_frame_size = Some(max_size);
    config
}

/// rustls needs a process-wide crypto provider before the first TLS config
/// is built. Installing it again is a no-op.
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
