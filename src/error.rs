//! Error types for Harbor gateway

use thiserror::Error;

/// Result type alias for Harbor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Harbor gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed bootstrap configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Reload target not declared by the service
    #[error("component '{component}' not found on service '{service}'")]
    ComponentNotFound { service: String, component: String },

    /// Connector call failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Plugin process failure (missing binary, handshake, dispense, RPC)
    #[error("process error: {0}")]
    Process(String),

    /// Restart attempted inside the cooldown window
    #[error("restart throttled, retry in {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    /// No service registered under the given identity
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Build a [`Error::ComponentNotFound`] for the given service and component
    pub fn component_not_found(service: impl Into<String>, component: impl Into<String>) -> Self {
        Self::ComponentNotFound {
            service: service.into(),
            component: component.into(),
        }
    }
}
