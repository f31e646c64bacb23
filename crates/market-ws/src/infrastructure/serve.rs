//! Public entry points.
//!
//! - [`serve`] dials, then hands the connection to the managed lifecycle.
//! - [`connect_duplex`] dials and returns the raw websocket; the caller owns
//!   reading, writing, keepalive and shutdown.

use tracing::info;

use crate::application::session::run_connection;
use crate::application::signal::{DoneSignal, StopHandle};
use crate::domain::{Compression, EndpointConfig, StreamError, StreamOptions, MAX_MESSAGE_SIZE};
use crate::infrastructure::dialer::{dial, WsStream};
use crate::infrastructure::ws_transport::into_connection;

/// Connects to `endpoint` and streams every message to `handler`.
///
/// Returns once the connection is up. From then on:
///
/// - `handler` is called for each message, in order, one at a time.
/// - `on_error` is called at most once, with the error that ended the
///   stream, unless the stream ended because the caller called
///   [`StopHandle::stop`].
/// - the [`DoneSignal`] completes when the read loop has exited.
///
/// Nothing reconnects automatically; watch the `DoneSignal` and call `serve`
/// again if the stream should come back.
///
/// # Errors
///
/// Setup failures only (bad proxy, bad endpoint, connect, handshake,
/// handshake timeout). These are returned here and never reach `on_error`.
pub async fn serve<H, E>(
    endpoint: &EndpointConfig,
    options: &StreamOptions,
    handler: H,
    on_error: E,
) -> Result<(DoneSignal, StopHandle), StreamError>
where
    H: FnMut(Vec<u8>) + Send + 'static,
    E: FnOnce(StreamError) + Send + 'static,
{
    let ws = dial(
        endpoint,
        options,
        Compression::Enabled,
        Some(MAX_MESSAGE_SIZE),
    )
    .await?;
    info!(
        "connected to {} (keepalive {})",
        endpoint.endpoint,
        if options.keepalive.is_some() { "on" } else { "off" }
    );
    Ok(run_connection(
        into_connection(ws),
        options.keepalive,
        handler,
        on_error,
    ))
}

/// Connects to `endpoint` without any lifecycle management.
///
/// Uses the same proxy resolution and handshake timeout as [`serve`], with
/// payload compression not requested. The [`MAX_MESSAGE_SIZE`] read limit is
/// not applied; the caller reads with tungstenite's defaults.
/// `options.keepalive` is ignored.
///
/// # Errors
///
/// Same setup failures as [`serve`].
pub async fn connect_duplex(
    endpoint: &EndpointConfig,
    options: &StreamOptions,
) -> Result<WsStream, StreamError> {
    let ws = dial(endpoint, options, Compression::Disabled, None).await?;
    info!("duplex connection to {} established", endpoint.endpoint);
    Ok(ws)
}
