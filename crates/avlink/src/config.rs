//! TOML device configuration.
//!
//! Each device a deployment talks to is described by one [`DeviceConfig`]:
//! which transport to reach it over, where it lives, and the timing knobs
//! for polling and on-demand connection handling.  Fields use serde
//! defaults throughout so a minimal file — often just a kind and a host —
//! works, and older files keep working when new fields appear.
//!
//! ```toml
//! [transport]
//! kind = "tcp"
//! host = "10.0.40.31"
//! port = 4352
//!
//! [timing]
//! poll_interval_ms = 5000
//! idle_timeout_ms = 30000
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::on_demand::OnDemandConfig;
use crate::transport::http::HttpTransport;
use crate::transport::serial::{SerialConfig, SerialTransport};
use crate::transport::ssh::{SshConfig, SshTransport};
use crate::transport::tcp::TcpTransport;
use crate::transport::udp::UdpTransport;
use crate::transport::TransportClient;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The transport section is missing a field its kind requires.
    #[error("transport kind `{kind}` requires `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level per-device configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Which transport carries the device protocol, and where the device is.
///
/// One flat section rather than per-kind tables: a device has exactly one
/// transport, and only the fields its kind needs have to be present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// Host or IP for `tcp`, `udp`, `ssh`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// OS serial device path for `serial`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Credentials for `ssh`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Endpoint URL for `http`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Supported transport kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
    Serial,
    Ssh,
    Http,
}

/// Polling and on-demand timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    /// Status poll interval.  `0` disables polling.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Grace period after connect before a queued command is flushed.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Idle window after the last send before an on-demand link closes.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The on-demand sender settings this timing section describes.
    pub fn on_demand(&self) -> OnDemandConfig {
        OnDemandConfig {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    23
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_poll_interval_ms() -> u64 {
    5_000
}
fn default_settle_delay_ms() -> u64 {
    300
}
fn default_idle_timeout_ms() -> u64 {
    30_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            host: None,
            port: default_port(),
            device_path: None,
            baud_rate: default_baud_rate(),
            username: None,
            password: None,
            base_url: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

// ── Loading and the transport factory ─────────────────────────────────────────

/// Loads a [`DeviceConfig`] from `path`, returning the defaults if the file
/// does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_device_config(path: impl AsRef<Path>) -> Result<DeviceConfig, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeviceConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

impl TransportConfig {
    /// Builds the transport client this section describes.  No connection
    /// is attempted; the client connects on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a field the chosen kind
    /// needs is absent.
    pub fn build_transport(&self) -> Result<Arc<dyn TransportClient>, ConfigError> {
        match self.kind {
            TransportKind::Tcp => {
                let host = self.require("tcp", "host", self.host.as_deref())?;
                Ok(Arc::new(TcpTransport::new(format!("{host}:{}", self.port))))
            }
            TransportKind::Udp => {
                let host = self.require("udp", "host", self.host.as_deref())?;
                Ok(Arc::new(UdpTransport::new(format!("{host}:{}", self.port))))
            }
            TransportKind::Serial => {
                let path = self.require("serial", "device_path", self.device_path.as_deref())?;
                Ok(Arc::new(SerialTransport::new(SerialConfig::new(
                    path,
                    self.baud_rate,
                ))))
            }
            TransportKind::Ssh => {
                let host = self.require("ssh", "host", self.host.as_deref())?;
                let username = self.require("ssh", "username", self.username.as_deref())?;
                let password = self.require("ssh", "password", self.password.as_deref())?;
                Ok(Arc::new(SshTransport::new(SshConfig::new(
                    host, self.port, username, password,
                ))))
            }
            TransportKind::Http => {
                let url = self.require("http", "base_url", self.base_url.as_deref())?;
                Ok(Arc::new(HttpTransport::new(url)))
            }
        }
    }

    fn require<'a>(
        &self,
        kind: &'static str,
        field: &'static str,
        value: Option<&'a str>,
    ) -> Result<&'a str, ConfigError> {
        value.ok_or(ConfigError::MissingField { kind, field })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
