//! Configuration management for the lcdsrv daemon.
//!
//! This module provides TOML-based configuration file loading.
//! The default configuration path is `~/.config/lcdsrv/config.toml`.
//!
//! The configuration is read once at startup. After the gateway is built
//! from it, nothing in the running daemon changes it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 6116;

/// Default bound on concurrent clients.
pub const DEFAULT_MAX_CLIENTS: usize = 7;

/// Upper bound accepted for `max_clients`.
pub const MAX_CLIENTS_LIMIT: usize = 64;

/// Default I2C bus number (`/dev/i2c-4`).
pub const DEFAULT_I2C_BUS: u8 = 4;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("max_clients must be between 1 and 64, got {0}")]
    InvalidMaxClients(usize),

    #[error("address must be a 7-bit I2C address (0x03..=0x77), got {0:#04x}")]
    InvalidDeviceAddress(u8),

    #[error("socket_path must not be empty when listening on a unix socket")]
    EmptySocketPath,

    #[error("ip must not be empty when listening on tcp")]
    EmptyIp,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("unknown listen mode '{0}', expected 'tcp' or 'unix'")]
    InvalidListenMode(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the lcdsrv daemon.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Process-level settings.
    pub daemon: DaemonConfig,

    /// Where clients connect.
    pub listen: ListenConfig,

    /// The attached display.
    pub display: DisplayConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// PID file written at startup and removed on exit.
    pub pid_file: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily log files. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
}

/// Kind of listening endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenMode {
    /// TCP socket bound to `ip:port`.
    #[default]
    Tcp,
    /// Unix domain socket at `socket_path`.
    Unix,
}

impl ListenMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenMode::Tcp => "tcp",
            ListenMode::Unix => "unix",
        }
    }
}

impl fmt::Display for ListenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListenMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(ListenMode::Tcp)
        } else if s.eq_ignore_ascii_case("unix") {
            Ok(ListenMode::Unix)
        } else {
            Err(ConfigError::InvalidListenMode(s.to_string()))
        }
    }
}

impl<'de> Deserialize<'de> for ListenMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Listening endpoint configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListenConfig {
    /// TCP or Unix socket.
    pub mode: ListenMode,

    /// Address or host name to bind in TCP mode.
    pub ip: String,

    /// Port to bind in TCP mode.
    pub port: u16,

    /// Socket file in Unix mode.
    pub socket_path: PathBuf,

    /// Maximum number of concurrent clients.
    pub max_clients: usize,
}

/// Bus backend driving the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    /// Linux `/dev/i2c-N` character device.
    #[default]
    I2cdev,
    /// No hardware: bus transactions are only logged.
    Trace,
}

/// Display configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Bus backend.
    pub backend: DisplayBackend,

    /// I2C bus number.
    pub bus: u8,

    /// 7-bit address of the port expander.
    pub address: u8,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: default_runtime_dir().join("lcdsrv.pid"),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            mode: ListenMode::Tcp,
            ip: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            socket_path: default_runtime_dir().join("lcdsrv.sock"),
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backend: DisplayBackend::I2cdev,
            bus: DEFAULT_I2C_BUS,
            address: lcdsrv_protocol::DEFAULT_DEVICE_ADDRESS,
        }
    }
}

impl DisplayConfig {
    /// Path of the bus device node.
    pub fn bus_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/i2c-{}", self.bus))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lcdsrv")
        .join("config.toml")
}

/// Directory for the PID file and the Unix socket.
fn default_runtime_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - LCDSRV_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - LCDSRV_LISTEN_MODE: Override listen mode (tcp, unix)
    ///
    /// Empty values are ignored. An unknown listen mode is an error.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(level) = std::env::var("LCDSRV_LOG_LEVEL") {
            if !level.is_empty() {
                self.daemon.log_level = level;
            }
        }

        if let Ok(mode) = std::env::var("LCDSRV_LISTEN_MODE") {
            if !mode.is_empty() {
                self.listen.mode = mode.parse()?;
            }
        }

        Ok(())
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.max_clients < 1 || self.listen.max_clients > MAX_CLIENTS_LIMIT {
            return Err(ConfigError::InvalidMaxClients(self.listen.max_clients));
        }

        match self.listen.mode {
            ListenMode::Tcp => {
                if self.listen.port == 0 {
                    return Err(ConfigError::InvalidPort(self.listen.port));
                }
                if self.listen.ip.trim().is_empty() {
                    return Err(ConfigError::EmptyIp);
                }
            }
            ListenMode::Unix => {
                if self.listen.socket_path.as_os_str().is_empty() {
                    return Err(ConfigError::EmptySocketPath);
                }
            }
        }

        if !(0x03..=0x77).contains(&self.display.address) {
            return Err(ConfigError::InvalidDeviceAddress(self.display.address));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_dir.is_none());
        assert_eq!(config.listen.mode, ListenMode::Tcp);
        assert_eq!(config.listen.port, 6116);
        assert_eq!(config.listen.max_clients, 7);
        assert_eq!(config.display.bus, 4);
        assert_eq!(config.display.address, 0x20);
        assert_eq!(config.display.backend, DisplayBackend::I2cdev);
    }

    #[test]
    fn test_default_paths() {
        let config = Config::default();
        assert!(config.daemon.pid_file.ends_with("lcdsrv.pid"));
        assert!(config.listen.socket_path.ends_with("lcdsrv.sock"));
        assert_eq!(config.display.bus_path(), PathBuf::from("/dev/i2c-4"));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[listen]
port = 7000
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.listen.port, 7000);
        assert_eq!(config.listen.max_clients, DEFAULT_MAX_CLIENTS);
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
pid_file = "/run/lcdsrv.pid"
log_level = "debug"
log_dir = "/var/log/lcdsrv"

[listen]
mode = "unix"
ip = "0.0.0.0"
port = 7001
socket_path = "/run/lcdsrv.sock"
max_clients = 3

[display]
backend = "trace"
bus = 1
address = 0x27
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.pid_file, PathBuf::from("/run/lcdsrv.pid"));
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.log_dir, Some(PathBuf::from("/var/log/lcdsrv")));
        assert_eq!(config.listen.mode, ListenMode::Unix);
        assert_eq!(config.listen.ip, "0.0.0.0");
        assert_eq!(config.listen.port, 7001);
        assert_eq!(config.listen.socket_path, PathBuf::from("/run/lcdsrv.sock"));
        assert_eq!(config.listen.max_clients, 3);
        assert_eq!(config.display.backend, DisplayBackend::Trace);
        assert_eq!(config.display.bus, 1);
        assert_eq!(config.display.address, 0x27);
    }

    #[test]
    fn test_listen_mode_case_insensitive() {
        let config = Config::from_toml("[listen]\nmode = \"UNIX\"\n").unwrap();
        assert_eq!(config.listen.mode, ListenMode::Unix);

        let config = Config::from_toml("[listen]\nmode = \"Tcp\"\n").unwrap();
        assert_eq!(config.listen.mode, ListenMode::Tcp);
    }

    #[test]
    fn test_listen_mode_invalid() {
        let result = Config::from_toml("[listen]\nmode = \"udp\"\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));

        assert_eq!(
            "udp".parse::<ListenMode>(),
            Err(ConfigError::InvalidListenMode("udp".to_string()))
        );
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[listen
port = 1
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_port_out_of_range() {
        let result = Config::from_toml("[listen]\nport = 70000\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[listen]\nmode = \"UNIX\"\nport = 9999\n").unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded.listen.mode, ListenMode::Unix);
        assert_eq!(loaded.listen.port, 9999);
        assert_eq!(loaded.display, DisplayConfig::default());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("lcdsrv/config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::remove_var("LCDSRV_LISTEN_MODE");
        std::env::set_var("LCDSRV_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.daemon.log_level, "trace");

        std::env::remove_var("LCDSRV_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("LCDSRV_LOG_LEVEL", "");
        std::env::set_var("LCDSRV_LISTEN_MODE", "");

        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config, Config::default());

        std::env::remove_var("LCDSRV_LOG_LEVEL");
        std::env::remove_var("LCDSRV_LISTEN_MODE");
    }

    #[test]
    #[serial]
    fn test_env_override_listen_mode() {
        std::env::remove_var("LCDSRV_LOG_LEVEL");
        std::env::set_var("LCDSRV_LISTEN_MODE", "unix");

        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.listen.mode, ListenMode::Unix);

        std::env::remove_var("LCDSRV_LISTEN_MODE");
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_listen_mode_rejected() {
        std::env::remove_var("LCDSRV_LOG_LEVEL");
        std::env::set_var("LCDSRV_LISTEN_MODE", "carrier-pigeon");

        let mut config = Config::default();
        let result = config.apply_env_overrides();
        std::env::remove_var("LCDSRV_LISTEN_MODE");

        assert_eq!(
            result,
            Err(ConfigError::InvalidListenMode("carrier-pigeon".to_string()))
        );
        assert_eq!(config.listen.mode, ListenMode::Tcp);
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_max_clients_bounds() {
        let mut config = Config::default();

        config.listen.max_clients = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxClients(0)));

        config.listen.max_clients = MAX_CLIENTS_LIMIT + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxClients(MAX_CLIENTS_LIMIT + 1))
        );

        config.listen.max_clients = 1;
        assert!(config.validate().is_ok());

        config.listen.max_clients = MAX_CLIENTS_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = Config::default();
        config.listen.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort(0)));

        // Port is irrelevant for unix sockets
        config.listen.mode = ListenMode::Unix;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_ip() {
        let mut config = Config::default();
        config.listen.ip = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyIp));
    }

    #[test]
    fn test_validate_empty_socket_path() {
        let mut config = Config::default();
        config.listen.mode = ListenMode::Unix;
        config.listen.socket_path = PathBuf::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptySocketPath));
    }

    #[test]
    fn test_validate_device_address() {
        let mut config = Config::default();

        config.display.address = 0x78;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDeviceAddress(0x78))
        );

        config.display.address = 0x02;
        assert!(config.validate().is_err());

        config.display.address = 0x27;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();

        for level in ["trace", "DEBUG", "Info", "warn", "error"] {
            config.daemon.log_level = level.to_string();
            assert!(config.validate().is_ok(), "level {}", level);
        }

        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }
}
