//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiConfig;
use crate::relay::HubConfig;
use crate::stream::{ReconnectPolicy, StreamConfig};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub stream: StreamSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8690
}

fn default_max_connections() -> usize {
    1000
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

impl ApiSection {
    pub fn to_api_config(&self) -> ApiConfig {
        ApiConfig::new(self.host.clone(), self.port)
    }

    pub fn to_hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.max_connections,
        }
    }
}

/// Remote stream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_ws_endpoint")]
    pub ws_endpoint: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_sign_timeout_secs")]
    pub sign_timeout_secs: u64,

    #[serde(default = "default_reconnect_initial_secs")]
    pub reconnect_initial_delay_secs: u64,

    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_delay_secs: u64,

    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_max_attempts: u32,

    #[serde(default = "default_idle_reap_secs")]
    pub idle_reap_interval_secs: u64,

    /// External command invoked to finish URL signing. The digest is passed
    /// as the last argument; the command prints the signature to stdout.
    pub sign_command: Option<String>,
}

fn default_base_url() -> String {
    StreamConfig::default().base_url
}

fn default_ws_endpoint() -> String {
    StreamConfig::default().ws_endpoint
}

fn default_user_agent() -> String {
    StreamConfig::default().user_agent
}

fn default_heartbeat_secs() -> u64 {
    5
}

fn default_sign_timeout_secs() -> u64 {
    10
}

fn default_reconnect_initial_secs() -> u64 {
    3
}

fn default_reconnect_max_secs() -> u64 {
    60
}

fn default_reconnect_attempts() -> u32 {
    10
}

fn default_idle_reap_secs() -> u64 {
    60
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_endpoint: default_ws_endpoint(),
            user_agent: default_user_agent(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            sign_timeout_secs: default_sign_timeout_secs(),
            reconnect_initial_delay_secs: default_reconnect_initial_secs(),
            reconnect_max_delay_secs: default_reconnect_max_secs(),
            reconnect_max_attempts: default_reconnect_attempts(),
            idle_reap_interval_secs: default_idle_reap_secs(),
            sign_command: None,
        }
    }
}

impl StreamSection {
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            base_url: self.base_url.clone(),
            ws_endpoint: self.ws_endpoint.clone(),
            user_agent: self.user_agent.clone(),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            sign_timeout: Duration::from_secs(self.sign_timeout_secs),
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_secs(self.reconnect_initial_delay_secs),
                max_delay: Duration::from_secs(self.reconnect_max_delay_secs),
                max_attempts: self.reconnect_max_attempts,
            },
        }
    }

    pub fn idle_reap_interval(&self) -> Duration {
        Duration::from_secs(self.idle_reap_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("liverelay").join("config.toml")),
            Some(PathBuf::from("/etc/liverelay/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("LIVERELAY_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = std::env::var("LIVERELAY_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Ok(max) = std::env::var("LIVERELAY_MAX_CONNECTIONS") {
            if let Ok(m) = max.parse() {
                self.api.max_connections = m;
            }
        }

        if let Ok(base_url) = std::env::var("LIVERELAY_BASE_URL") {
            self.stream.base_url = base_url;
        }
        if let Ok(ws_endpoint) = std::env::var("LIVERELAY_WS_ENDPOINT") {
            self.stream.ws_endpoint = ws_endpoint;
        }
        if let Ok(sign_command) = std::env::var("LIVERELAY_SIGN_COMMAND") {
            self.stream.sign_command = Some(sign_command);
        }

        if let Ok(level) = std::env::var("LIVERELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LIVERELAY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiSection::default(),
            stream: StreamSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Live Relay Configuration
#
# Environment variables override these settings:
# - LIVERELAY_API_HOST
# - LIVERELAY_API_PORT
# - LIVERELAY_MAX_CONNECTIONS
# - LIVERELAY_BASE_URL
# - LIVERELAY_WS_ENDPOINT
# - LIVERELAY_SIGN_COMMAND
# - LIVERELAY_LOG_LEVEL
# - LIVERELAY_LOG_FORMAT

[api]
# Relay server host
host = "0.0.0.0"

# Relay server port
port = 8690

# Maximum concurrent relay connections
max_connections = 1000

[stream]
# Platform landing page, trailing slash included
base_url = "https://live.douyin.com/"

# Stream push endpoint
ws_endpoint = "wss://webcast5-ws-web-hl.douyin.com/webcast/im/push/v2/"

# Keepalive cadence while connected (seconds)
heartbeat_interval_secs = 5

# Ceiling on the external signing step (seconds)
sign_timeout_secs = 10

# Reconnect backoff: initial delay, ceiling, attempt budget
reconnect_initial_delay_secs = 3
reconnect_max_delay_secs = 60
reconnect_max_attempts = 10

# How often idle watched rooms are closed (seconds)
idle_reap_interval_secs = 60

# External signing command; receives the digest as its last argument and
# prints the signature to stdout
# sign_command = "node sign.js"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.port, 8690);
        assert_eq!(config.stream.heartbeat_interval_secs, 5);
        assert!(config.stream.sign_command.is_none());
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_default_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.api.port, 8690);
        assert_eq!(config.stream.reconnect_max_attempts, 10);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            port = 9000
            max_connections = 10

            [stream]
            sign_command = "node sign.js"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.api.max_connections, 10);
        assert_eq!(config.stream.sign_command.as_deref(), Some("node sign.js"));
        assert_eq!(config.stream.base_url, "https://live.douyin.com/");
    }

    #[test]
    fn test_section_conversions() {
        let section = StreamSection {
            heartbeat_interval_secs: 7,
            sign_timeout_secs: 3,
            reconnect_max_attempts: 2,
            ..StreamSection::default()
        };
        let stream = section.to_stream_config();
        assert_eq!(stream.heartbeat_interval, Duration::from_secs(7));
        assert_eq!(stream.sign_timeout, Duration::from_secs(3));
        assert_eq!(stream.reconnect.max_attempts, 2);

        let api = ApiSection::default().to_api_config();
        assert_eq!(api.addr(), "0.0.0.0:8690");

        let hub = ApiSection {
            max_connections: 25,
            ..ApiSection::default()
        }
        .to_hub_config();
        assert_eq!(hub.max_connections, 25);
    }
}
