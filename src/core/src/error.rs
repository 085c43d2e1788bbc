use thiserror::Error;

/// A3S Reaper error types
#[derive(Error, Debug)]
pub enum ReaperError {
    /// The registry reports that the repository does not exist
    #[error("Repository not found: {repository}")]
    RepositoryNotFound { repository: String },

    /// Transport or protocol failure talking to the registry
    #[error("Registry unavailable: {registry} - {message}")]
    RegistryUnavailable { registry: String, message: String },

    /// The final report could not be delivered
    #[error("Notification delivery failed: {0}")]
    NotificationDeliveryFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ReaperError {
    /// Shorthand for a registry transport/protocol failure.
    pub fn unavailable(registry: impl Into<String>, message: impl Into<String>) -> Self {
        ReaperError::RegistryUnavailable {
            registry: registry.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the repository does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReaperError::RepositoryNotFound { .. })
    }
}

impl From<serde_json::Error> for ReaperError {
    fn from(err: serde_json::Error) -> Self {
        ReaperError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ReaperError {
    fn from(err: serde_yaml::Error) -> Self {
        ReaperError::SerializationError(err.to_string())
    }
}

/// Result type alias for A3S Reaper operations
pub type Result<T> = std::result::Result<T, ReaperError>;
