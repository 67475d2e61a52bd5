//! Error types for narayana-talk

use thiserror::Error;

/// Bridge errors, one variant per failure class surfaced to the host
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Malformed or missing payload fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// No pending bytes, decode failure or decode timeout
    #[error("Resource error: {0}")]
    Resource(String),

    /// Avatar engine call failed or returned failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// Avatar swap failure
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Timeline error: {0}")]
    Timeline(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Message forwarded to the host in `OnError(method, message)`
    pub fn detail(&self) -> String {
        match self {
            BridgeError::Validation(msg)
            | BridgeError::Resource(msg)
            | BridgeError::Engine(msg)
            | BridgeError::Lifecycle(msg)
            | BridgeError::Timeline(msg)
            | BridgeError::Config(msg) => msg.clone(),
            BridgeError::Serialization(e) => format!("Invalid JSON: {}", e),
        }
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::Config(err.to_string())
    }
}
