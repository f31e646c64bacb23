//! TOML settings file for the `market-ws-tail` binary.
//!
//! ```toml
//! [stream]
//! endpoint = "wss://stream.example.com:9443/ws/btcusdt@trade"
//! proxy = "http://127.0.0.1:3128"
//!
//! [keepalive]
//! enabled = true
//! timeout_secs = 30
//! check_interval_secs = 30
//! ```
//!
//! Every field except `stream.endpoint` may be omitted; `#[serde(default)]`
//! fills in the same values [`StreamOptions::default`] uses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::{EndpointConfig, KeepaliveConfig, StreamOptions, KEEPALIVE_INTERVAL};

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level settings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub stream: StreamSection,
    #[serde(default)]
    pub keepalive: KeepaliveSection,
}

/// `[stream]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSection {
    /// Target websocket URI.
    pub endpoint: String,
    /// Explicit proxy; absent means "use the environment".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// `[keepalive]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeepaliveSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keepalive_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub check_interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_keepalive_secs() -> u64 {
    KEEPALIVE_INTERVAL.as_secs()
}

impl KeepaliveSection {
    fn validate(&self) -> Result<(), SettingsError> {
        if !self.enabled {
            return Ok(());
        }
        for (field, value) in [
            ("keepalive.timeout_secs", self.timeout_secs),
            ("keepalive.check_interval_secs", self.check_interval_secs),
        ] {
            if value == 0 {
                return Err(SettingsError::Invalid {
                    field,
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for KeepaliveSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timeout_secs: default_keepalive_secs(),
            check_interval_secs: default_keepalive_secs(),
        }
    }
}

impl Settings {
    /// Parses a settings document.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] if the TOML is malformed or
    /// `stream.endpoint` is missing, and [`SettingsError::Invalid`] if an
    /// enabled keepalive has a zero timeout or check interval.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text)?;
        settings.keepalive.validate()?;
        Ok(settings)
    }

    /// Reads and parses the settings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Io`] if the file cannot be read and
    /// [`SettingsError::Parse`] if its content is invalid.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Builds the endpoint configuration described by `[stream]`.
    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig {
            endpoint: self.stream.endpoint.clone(),
            proxy: self.stream.proxy.clone(),
        }
    }

    /// Builds the stream options described by `[keepalive]`. Proxy variables
    /// are read from the process at dial time.
    pub fn stream_options(&self) -> StreamOptions {
        let keepalive = self.keepalive.enabled.then(|| KeepaliveConfig {
            timeout: Duration::from_secs(self.keepalive.timeout_secs),
            check_interval: Duration::from_secs(self.keepalive.check_interval_secs),
        });
        StreamOptions {
            keepalive,
            proxy_env: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
