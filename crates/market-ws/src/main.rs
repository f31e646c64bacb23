//! market-ws-tail: prints every message from a market-data websocket.
//!
//! # Usage
//!
//! ```text
//! market-ws-tail [OPTIONS] [ENDPOINT]
//!
//! Options:
//!   --config <PATH>              TOML settings file
//!   --proxy <URL>                Explicit proxy (http://, socks5://, socks5h://)
//!   --no-keepalive               Disable the ping watchdog
//!   --keepalive-timeout <SECS>   Watchdog timeout [default: 30]
//! ```
//!
//! Either `ENDPOINT` or `--config` must be given. Command-line values override
//! the settings file.
//!
//! # Environment variables
//!
//! | Variable                   | Description                          |
//! |----------------------------|--------------------------------------|
//! | `MARKET_WS_ENDPOINT`       | Endpoint when no positional is given |
//! | `MARKET_WS_CONFIG`         | Settings file path                   |
//! | `MARKET_WS_PROXY`          | Explicit proxy                       |
//! | `HTTP_PROXY`/`HTTPS_PROXY` | Used when no explicit proxy is set   |
//! | `NO_PROXY`                 | Hosts that bypass the proxy          |
//! | `RUST_LOG`                 | Log filter (default `info`)          |
//!
//! Messages go to stdout, one per line; logs go to stderr. The process exits
//! non-zero if the stream ends with an error.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use market_ws::domain::{EndpointConfig, KeepaliveConfig, Settings, StreamOptions};
use market_ws::infrastructure::serve;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Tails a market-data websocket stream to stdout.
#[derive(Debug, Parser)]
#[command(
    name = "market-ws-tail",
    about = "Print every message from a market-data websocket stream",
    version
)]
struct Cli {
    /// Websocket endpoint, e.g. `wss://stream.example.com:9443/ws/btcusdt@trade`.
    #[arg(env = "MARKET_WS_ENDPOINT")]
    endpoint: Option<String>,

    /// TOML settings file.
    #[arg(long, env = "MARKET_WS_CONFIG")]
    config: Option<PathBuf>,

    /// Explicit proxy URL. Overrides `HTTP_PROXY` / `HTTPS_PROXY`.
    #[arg(long, env = "MARKET_WS_PROXY")]
    proxy: Option<String>,

    /// Do not police server pings.
    #[arg(long)]
    no_keepalive: bool,

    /// Close the stream if the server sends no ping for this many seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    keepalive_timeout: Option<u64>,
}

impl Cli {
    /// Merges the settings file (if any) with command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be loaded or no endpoint
    /// is configured anywhere.
    fn into_stream_config(self) -> anyhow::Result<(EndpointConfig, StreamOptions)> {
        let (mut endpoint, mut options) = match &self.config {
            Some(path) => {
                let settings = Settings::load(path)
                    .with_context(|| format!("loading settings from {}", path.display()))?;
                (Some(settings.endpoint_config()), settings.stream_options())
            }
            None => (None, StreamOptions::default()),
        };

        if let Some(uri) = self.endpoint {
            let proxy = endpoint.and_then(|e| e.proxy);
            endpoint = Some(EndpointConfig {
                endpoint: uri,
                proxy,
            });
        }
        let Some(mut endpoint) = endpoint else {
            bail!("no endpoint given; pass ENDPOINT or --config");
        };
        if let Some(proxy) = self.proxy {
            endpoint.proxy = Some(proxy);
        }

        if self.no_keepalive {
            options = options.without_keepalive();
        } else if let Some(secs) = self.keepalive_timeout {
            let base = options.keepalive.unwrap_or_default();
            options = options.with_keepalive(KeepaliveConfig {
                timeout: Duration::from_secs(secs),
                ..base
            });
        }

        Ok((endpoint, options))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (endpoint, options) = Cli::parse().into_stream_config()?;
    info!("market-ws-tail starting: endpoint={}", endpoint.endpoint);

    let (err_tx, mut err_rx) = oneshot::channel();
    let (done, stop) = serve(
        &endpoint,
        &options,
        |msg| {
            let mut out = std::io::stdout().lock();
            // A closed stdout is not worth tearing the stream down for.
            let _ = out.write_all(&msg);
            let _ = out.write_all(b"\n");
        },
        move |err| {
            let _ = err_tx.send(err);
        },
    )
    .await
    .with_context(|| format!("connecting to {}", endpoint.endpoint))?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            match res {
                Ok(()) => info!("received Ctrl+C, stopping"),
                Err(e) => warn!("failed to listen for Ctrl+C: {e}"),
            }
            stop.stop();
            done.wait().await;
        }
        _ = done.wait() => {}
    }

    if let Ok(err) = err_rx.try_recv() {
        bail!("stream ended: {err}");
    }
    info!("market-ws-tail stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_endpoint_uses_default_options() {
        let cli = Cli::parse_from(["market-ws-tail", "wss://stream.example.com/ws"]);

        let (endpoint, options) = cli.into_stream_config().unwrap();

        assert_eq!(endpoint.endpoint, "wss://stream.example.com/ws");
        assert_eq!(endpoint.proxy, None);
        assert_eq!(options, StreamOptions::default());
    }

    #[test]
    fn test_missing_endpoint_is_an_error() {
        let cli = Cli {
            endpoint: None,
            config: None,
            proxy: None,
            no_keepalive: false,
            keepalive_timeout: None,
        };

        assert!(cli.into_stream_config().is_err());
    }

    #[test]
    fn test_flags_override_keepalive_and_proxy() {
        let cli = Cli::parse_from([
            "market-ws-tail",
            "ws://localhost:9000/feed",
            "--proxy",
            "socks5://127.0.0.1:1080",
            "--keepalive-timeout",
            "90",
        ]);

        let (endpoint, options) = cli.into_stream_config().unwrap();

        assert_eq!(endpoint.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        let ka = options.keepalive.unwrap();
        assert_eq!(ka.timeout, Duration::from_secs(90));
        assert_eq!(ka.check_interval, KeepaliveConfig::default().check_interval);
    }

    #[test]
    fn test_zero_keepalive_timeout_is_rejected() {
        let result = Cli::try_parse_from([
            "market-ws-tail",
            "ws://localhost:9000",
            "--keepalive-timeout",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_no_keepalive_flag_disables_watchdog() {
        let cli = Cli::parse_from(["market-ws-tail", "ws://localhost:9000", "--no-keepalive"]);

        let (_, options) = cli.into_stream_config().unwrap();

        assert!(options.keepalive.is_none());
    }

    #[test]
    fn test_config_file_supplies_endpoint_and_positional_overrides_it() {
        let dir = std::env::temp_dir().join(format!("market-ws-tail-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(
            &path,
            "[stream]\nendpoint = \"wss://a.example.com/ws\"\nproxy = \"http://127.0.0.1:3128\"\n\
             [keepalive]\nenabled = false\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "market-ws-tail",
            "wss://b.example.com/ws",
            "--config",
            path.to_str().unwrap(),
        ]);
        let (endpoint, options) = cli.into_stream_config().unwrap();

        assert_eq!(endpoint.endpoint, "wss://b.example.com/ws");
        assert_eq!(endpoint.proxy.as_deref(), Some("http://127.0.0.1:3128"));
        assert!(options.keepalive.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
