use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Response body the backend returns for a failed request
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

/// Errors surfaced by the client to its embedding application
#[derive(Debug)]
pub enum ClientError {
    /// Configuration could not be loaded or is unusable
    Config(ConfigError),
    /// The realtime endpoint could not be used as given
    Transport(String),
    /// The HTTP request itself failed (connect, timeout, decode)
    Http(reqwest::Error),
    /// The backend answered with a non-success status
    Api { status: u16, message: String },
    /// A payload could not be serialized or deserialized
    Serialization(serde_json::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Config(e) => write!(f, "Configuration error: {}", e),
            ClientError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ClientError::Http(e) => write!(f, "HTTP request failed: {}", e),
            ClientError::Api { status, message } => write!(f, "API error {}: {}", status, message),
            ClientError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        ClientError::Config(e)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e)
    }
}
