//! # Configuration Management
//!
//! Centralized configuration for a Speak node's transport layer.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! Durations are written in milliseconds.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default TCP port for the peer protocol
pub const DEFAULT_PORT: u16 = 8555;

/// Software version announced in outbound `version` frames (0.0.1-0)
pub const SOFTWARE_VERSION: [u8; 4] = [0, 0, 1, 0];

/// Max allowed payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Main node configuration containing all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub peers: PeersConfig,

    #[serde(default)]
    pub handshake: HandshakeConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub pow: PowConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SPEAK_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("SPEAK_LISTEN_ADDRESS") {
            self.server.listen_address = addr;
        }

        if let Some(peers) = lookup("SPEAK_BOOTSTRAP_PEERS") {
            self.peers.bootstrap = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(ms) = lookup("SPEAK_HANDSHAKE_TIMEOUT_MS") {
            self.handshake.handshake_timeout = Duration::from_millis(parse_env(
                "SPEAK_HANDSHAKE_TIMEOUT_MS",
                &ms,
            )?);
        }

        if let Some(ms) = lookup("SPEAK_IDLE_TIMEOUT_MS") {
            self.handshake.idle_timeout =
                Duration::from_millis(parse_env("SPEAK_IDLE_TIMEOUT_MS", &ms)?);
        }

        if let Some(workers) = lookup("SPEAK_POW_WORKERS") {
            self.pow.workers = parse_env("SPEAK_POW_WORKERS", &workers)?;
        }

        if let Some(level) = lookup("SPEAK_LOG_LEVEL") {
            self.logging.log_level = level
                .parse()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid log level: {level}")))?;
        }

        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.peers.validate());
        errors.extend(self.handshake.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.pow.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {key}: '{value}'")))
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8555")
    pub listen_address: String,

    /// Inbound connections beyond this are closed immediately
    pub max_connections: usize,

    /// Timeout for graceful shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_connections: 125,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.listen_address.is_empty() {
            errors.push("Listen address cannot be empty".to_string());
        } else if self.listen_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid listen address format: '{}' (expected format: '0.0.0.0:8555')",
                self.listen_address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Outbound peers and registry housekeeping
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Peers dialed at startup ("host:port")
    pub bootstrap: Vec<String>,

    /// Interval between dead-session sweeps
    #[serde(with = "duration_serde")]
    pub reap_interval: Duration,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            bootstrap: Vec::new(),
            reap_interval: timeout::REAP_INTERVAL,
        }
    }
}

impl PeersConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for peer in &self.bootstrap {
            match peer.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
                _ => errors.push(format!(
                    "Invalid bootstrap peer: '{peer}' (expected format: 'host:8555')"
                )),
            }
        }

        if self.reap_interval.as_millis() < 100 {
            errors.push("Reap interval too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Version exchange parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Time allowed for the version exchange
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Inactivity limit once established
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Peers whose clock differs by this many seconds or more are rejected
    pub max_clock_skew_secs: u64,

    /// How long announced nonces are remembered for self-connection checks
    #[serde(with = "duration_serde")]
    pub nonce_ttl: Duration,

    /// Include data heights in outbound `version` payloads
    pub announce_heights: bool,

    /// major, minor, patch, revision
    pub software_version: [u8; 4],
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            idle_timeout: timeout::IDLE_TIMEOUT,
            max_clock_skew_secs: timeout::MAX_CLOCK_SKEW_SECS,
            nonce_ttl: Duration::from_secs(300),
            announce_heights: true,
            software_version: SOFTWARE_VERSION,
        }
    }
}

impl HandshakeConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 300 {
            errors.push("Handshake timeout too long (maximum: 300s)".to_string());
        }

        if self.idle_timeout < self.handshake_timeout {
            errors.push("Idle timeout cannot be shorter than handshake timeout".to_string());
        }

        if self.max_clock_skew_secs == 0 {
            errors.push("Max clock skew must be greater than 0".to_string());
        }

        if self.nonce_ttl < self.handshake_timeout {
            errors.push("Nonce TTL cannot be shorter than handshake timeout".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum declared payload length accepted from a peer
    pub max_payload_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > u32::MAX as usize {
            errors.push(format!(
                "Max payload size too large: {} bytes (length field is 32 bits)",
                self.max_payload_size
            ));
        }

        errors
    }
}

/// Proof-of-work search settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PowConfig {
    /// Worker threads; 0 means one per available CPU
    pub workers: usize,
}

impl PowConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.workers > 1024 {
            errors.push(format!(
                "Too many proof-of-work workers: {} (maximum: 1024)",
                self.workers
            ));
        }
        errors
    }

    /// Worker count with 0 resolved to the number of CPUs.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("speak-node"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
