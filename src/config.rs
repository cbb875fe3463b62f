use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, error};

/// Client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL of the realtime WebSocket endpoint
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between heartbeat pings on an open socket
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Fixed delay before each reconnect attempt, in seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Consecutive failed dials before the client stops reconnecting
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Dwell before visible unread comments are marked read, in milliseconds
    #[serde(default = "default_read_mark_delay_ms")]
    pub read_mark_delay_ms: u64,

    /// Minimum gap between outbound cursor frames, in milliseconds
    #[serde(default = "default_cursor_throttle_ms")]
    pub cursor_throttle_ms: u64,

    /// Timeout for REST requests, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bearer token attached to REST requests
    pub auth_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn read_mark_delay(&self) -> Duration {
        Duration::from_millis(self.read_mark_delay_ms)
    }

    pub fn cursor_throttle(&self) -> Duration {
        Duration::from_millis(self.cursor_throttle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            ws_base_url: default_ws_base_url(),
            environment: default_environment(),
            log_level: default_log_level(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            read_mark_delay_ms: default_read_mark_delay_ms(),
            cursor_throttle_ms: default_cursor_throttle_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            auth_token: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_api_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_ws_base_url() -> String {
    "ws://localhost:3000".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    3
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_read_mark_delay_ms() -> u64 {
    2000
}

fn default_cursor_throttle_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    10
}
