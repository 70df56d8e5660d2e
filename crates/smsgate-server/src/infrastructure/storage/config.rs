//! TOML-based configuration for the gateway server.
//!
//! The default location of the file is platform specific:
//! - Windows:  `%APPDATA%\SmsGateway\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/smsgate/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/SmsGateway/config.toml`
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! port = 2000
//! service_name = "SMSSender"
//! secured = false
//! allow_anonymous = false
//! bind_address = "0.0.0.0"
//!
//! [modem]
//! driver = "at"
//! port = "COM1"
//! baud_rate = 19200
//! timeout_ms = 300
//! ```
//!
//! Every field has a serde default, so a partial file (or no file at all)
//! yields a working configuration.  Values are read once per `start`; editing
//! the configuration of a running host only takes effect at the next start.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::driver::PortSettings;
use crate::infrastructure::network::ListenerConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub modem: ModemSettings,
}

/// Network publication settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSettings {
    /// TCP port the listener binds.  `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name the send service is published under.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Install the authorization gate on the listener.
    #[serde(default)]
    pub secured: bool,
    /// With `secured`, admit callers that present no identity.
    #[serde(default)]
    pub allow_anonymous: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Which modem implementation the server drives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// A GSM modem on a serial line, driven with AT commands.
    #[default]
    At,
    /// The in-memory modem; every send succeeds.
    Simulated,
}

/// Physical modem settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModemSettings {
    #[serde(default)]
    pub driver: DriverKind,
    /// Serial device, e.g. `COM1` or `/dev/ttyUSB0`.
    #[serde(default = "default_modem_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-command response timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    2000
}
fn default_service_name() -> String {
    "SMSSender".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_modem_port() -> String {
    "COM1".to_string()
}
fn default_baud_rate() -> u32 {
    19200
}
fn default_timeout_ms() -> u64 {
    300
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerSettings::default(),
            modem: ModemSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            service_name: default_service_name(),
            secured: false,
            allow_anonymous: false,
            bind_address: default_bind_address(),
        }
    }
}

impl Default for ModemSettings {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            port: default_modem_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ServerSettings {
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind_address: self.bind_address.clone(),
            port: self.port,
        }
    }
}

impl ModemSettings {
    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path for this platform.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the configuration at `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GatewayConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &GatewayConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("SmsGateway"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("smsgate"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("SmsGateway")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
