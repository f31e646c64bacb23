//! Proxy selection and tunnelling.
//!
//! # Selection
//!
//! An explicit proxy on the [`EndpointConfig`](crate::domain::EndpointConfig)
//! always wins and must parse; a bad one fails with `InvalidProxyUrl` before
//! anything touches the network. Without one, the [`ProxyEnv`] decides:
//!
//! | Target   | Variable      |
//! |----------|---------------|
//! | `ws://`  | `HTTP_PROXY`  |
//! | `wss://` | `HTTPS_PROXY` |
//!
//! `NO_PROXY` entries (hosts, domain suffixes, IPs and CIDR blocks) bypass
//! the proxy, and `localhost` / loopback targets are never proxied.
//! Environment values without a scheme mean `http://`.
//!
//! # Tunnels
//!
//! `http://` proxies get an HTTP `CONNECT`; `socks5://` and `socks5h://`
//! proxies go through tokio-socks. Either way the result is a plain
//! `TcpStream` already connected through to the target, so TLS and the
//! websocket upgrade run over it unchanged.

use std::net::IpAddr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::percent_decode_str;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;
use url::{Host, Url};

use crate::domain::{ProxyEnv, StreamError};

/// Longest proxy response head accepted for a `CONNECT`.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Picks the proxy for `target`, if any.
///
/// # Errors
///
/// Returns [`StreamError::InvalidProxyUrl`] when the chosen proxy string does
/// not parse or uses a scheme other than `http`, `socks5` or `socks5h`.
pub fn resolve_proxy(
    target: &Url,
    explicit: Option<&str>,
    env: &ProxyEnv,
) -> Result<Option<Url>, StreamError> {
    if let Some(raw) = explicit {
        return parse_proxy(raw).map(Some);
    }

    let Some(host) = target.host() else {
        return Ok(None);
    };
    if is_loopback(&host) {
        return Ok(None);
    }

    let raw = match target.scheme() {
        "wss" => env.https_proxy.as_deref(),
        _ => env.http_proxy.as_deref(),
    };
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };

    let port = target.port_or_known_default();
    if let Some(no_proxy) = env.no_proxy.as_deref() {
        if bypasses(no_proxy, &bare_host(&host), port) {
            debug!("NO_PROXY bypass for {host}");
            return Ok(None);
        }
    }

    if raw.contains("://") {
        parse_proxy(raw).map(Some)
    } else {
        parse_proxy(&format!("http://{raw}")).map(Some)
    }
}

fn parse_proxy(raw: &str) -> Result<Url, StreamError> {
    let invalid = |reason: String| StreamError::InvalidProxyUrl {
        proxy: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "socks5" | "socks5h" => {}
        other => return Err(invalid(format!("unsupported proxy scheme '{other}'"))),
    }
    if url.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(d) => d.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}

/// Host without IPv6 brackets, lower-cased.
pub(crate) fn bare_host(host: &Host<&str>) -> String {
    match host {
        Host::Domain(d) => d.to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

/// Whether `host:port` matches any entry of a `NO_PROXY` list.
fn bypasses(no_proxy: &str, host: &str, port: Option<u16>) -> bool {
    no_proxy
        .split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            if entry == "*" {
                return true;
            }

            if let Some(matched) = cidr_contains(&entry, host) {
                return matched;
            }

            let (pattern, entry_port) = split_port(&entry);
            if entry_port.is_some() && entry_port != port {
                return false;
            }

            if let Ok(ip) = pattern.parse::<IpAddr>() {
                return host.parse::<IpAddr>().map_or(false, |h| h == ip);
            }

            if let Some(suffix) = pattern.strip_prefix("*.").or(pattern.strip_prefix('.')) {
                host.ends_with(&format!(".{suffix}"))
            } else {
                host == pattern || host.ends_with(&format!(".{pattern}"))
            }
        })
}

/// `Some(hit)` when `entry` is a CIDR block (`10.0.0.0/8`, `fd00::/8`),
/// `None` when it is not one.
fn cidr_contains(entry: &str, host: &str) -> Option<bool> {
    let (net, bits) = entry.split_once('/')?;
    let net = net.parse::<IpAddr>().ok()?;
    let bits = bits.parse::<u32>().ok()?;
    let Ok(host) = host.parse::<IpAddr>() else {
        return Some(false);
    };

    let hit = match (net, host) {
        (IpAddr::V4(net), IpAddr::V4(host)) if bits <= 32 => {
            let mask = u32::MAX.checked_shl(32 - bits).unwrap_or(0);
            u32::from(net) & mask == u32::from(host) & mask
        }
        (IpAddr::V6(net), IpAddr::V6(host)) if bits <= 128 => {
            let mask = u128::MAX.checked_shl(128 - bits).unwrap_or(0);
            u128::from(net) & mask == u128::from(host) & mask
        }
        _ => false,
    };
    Some(hit)
}

fn split_port(entry: &str) -> (&str, Option<u16>) {
    if let Some(rest) = entry.strip_prefix('[') {
        // [v6]:port
        if let Some((ip, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (ip, port);
        }
    }
    if entry.parse::<IpAddr>().is_ok() {
        return (entry, None);
    }
    match entry.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name, Some(port)),
            Err(_) => (entry, None),
        },
        None => (entry, None),
    }
}

/// Opens a TCP stream to `host:port` through `proxy`.
///
/// # Errors
///
/// [`StreamError::Connect`] if the proxy is unreachable,
/// [`StreamError::ProxyTunnel`] if it refuses the tunnel.
pub async fn open_tunnel(proxy: &Url, host: &str, port: u16) -> Result<TcpStream, StreamError> {
    let proxy_host = proxy
        .host()
        .map(|h| bare_host(&h))
        .ok_or_else(|| StreamError::InvalidProxyUrl {
            proxy: proxy.to_string(),
            reason: "missing host".to_string(),
        })?;
    let proxy_port = proxy
        .port_or_known_default()
        .unwrap_or(if proxy.scheme() == "http" { 80 } else { 1080 });

    debug!("tunnelling to {host}:{port} via {}", proxy.scheme());
    match proxy.scheme() {
        "http" => http_connect(proxy, &proxy_host, proxy_port, host, port).await,
        _ => socks5_connect(proxy, &proxy_host, proxy_port, host, port).await,
    }
}

async fn http_connect(
    proxy: &Url,
    proxy_host: &str,
    proxy_port: u16,
    host: &str,
    port: u16,
) -> Result<TcpStream, StreamError> {
    let mut stream = TcpStream::connect((proxy_host, proxy_port))
        .await
        .map_err(|source| StreamError::Connect {
            addr: format!("{proxy_host}:{proxy_port}"),
            source,
        })?;

    let authority = if host.parse::<std::net::Ipv6Addr>().is_ok() {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(credentials) = basic_credentials(proxy) {
        request.push_str(&format!("Proxy-Authorization: Basic {credentials}\r\n"));
    }
    request.push_str("\r\n");

    let tunnel_err = |reason: String| StreamError::ProxyTunnel {
        proxy: redacted(proxy),
        reason,
    };

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| tunnel_err(e.to_string()))?;

    // Read byte-wise so nothing past the response head is consumed.
    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_CONNECT_RESPONSE {
            return Err(tunnel_err("response head too large".to_string()));
        }
        let byte = stream
            .read_u8()
            .await
            .map_err(|e| tunnel_err(format!("reading response: {e}")))?;
        head.push(byte);
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| tunnel_err(format!("malformed status line '{status_line}'")))?;

    if !(200..300).contains(&status) {
        return Err(tunnel_err(format!("proxy answered '{status_line}'")));
    }
    Ok(stream)
}

async fn socks5_connect(
    proxy: &Url,
    proxy_host: &str,
    proxy_port: u16,
    host: &str,
    port: u16,
) -> Result<TcpStream, StreamError> {
    let proxy_addr = format!("{proxy_host}:{proxy_port}");
    let target = (host, port);

    // tokio-socks rejects empty passwords, so a bare username means no auth.
    let result = match userinfo(proxy).filter(|(_, password)| !password.is_empty()) {
        Some((username, password)) => {
            Socks5Stream::connect_with_password(
                proxy_addr.as_str(),
                target,
                &username,
                &password,
            )
            .await
        }
        None => Socks5Stream::connect(proxy_addr.as_str(), target).await,
    };

    result
        .map(Socks5Stream::into_inner)
        .map_err(|e| StreamError::ProxyTunnel {
            proxy: redacted(proxy),
            reason: e.to_string(),
        })
}

/// Decoded `(username, password)` from the proxy URL, if a username is set.
/// `Url` keeps userinfo percent-encoded; proxies expect the raw values.
fn userinfo(proxy: &Url) -> Option<(String, String)> {
    if proxy.username().is_empty() {
        return None;
    }
    let decode = |s: &str| percent_decode_str(s).decode_utf8_lossy().into_owned();
    Some((
        decode(proxy.username()),
        decode(proxy.password().unwrap_or_default()),
    ))
}

fn basic_credentials(proxy: &Url) -> Option<String> {
    let (username, password) = userinfo(proxy)?;
    Some(STANDARD.encode(format!("{username}:{password}")))
}

/// Proxy URL without credentials, for errors and logs.
fn redacted(proxy: &Url) -> String {
    let mut shown = proxy.clone();
    let _ = shown.set_username("");
    let _ = shown.set_password(None);
    shown.to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
