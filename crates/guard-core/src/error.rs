//! Error handling for gpu-stress-guardian
//!
//! Provides a unified error type and result type for use across all guardian
//! components.

/// Result type alias for guardian operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for gpu-stress-guardian
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Telemetry collection errors
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Workload actuator errors
    #[error("Actuator error: {0}")]
    Actuator(String),

    /// Control engine errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Session supervision errors
    #[error("Session error: {0}")]
    Session(String),

    /// Checkpoint persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Profile store errors
    #[error("Profile store error: {0}")]
    ProfileStore(String),

    /// Event log sink errors
    #[error("Event log error: {0}")]
    EventLog(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration parsing errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a telemetry error
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry(msg.into())
    }

    /// Create an actuator error
    pub fn actuator(msg: impl Into<String>) -> Self {
        Self::Actuator(msg.into())
    }

    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create a profile store error
    pub fn profile_store(msg: impl Into<String>) -> Self {
        Self::ProfileStore(msg.into())
    }

    /// Create an event log error
    pub fn event_log(msg: impl Into<String>) -> Self {
        Self::EventLog(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Telemetry(_) | Error::Timeout(_) | Error::EventLog(_) | Error::Io(_)
        )
    }

    /// Check if this error indicates a caller-side problem
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfiguration(_) | Error::Config(_))
    }

    /// Get the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidConfiguration(_) => "configuration",
            Error::Telemetry(_) => "telemetry",
            Error::Actuator(_) => "actuator",
            Error::Engine(_) => "engine",
            Error::Session(_) => "session",
            Error::Checkpoint(_) => "checkpoint",
            Error::ProfileStore(_) => "profile_store",
            Error::EventLog(_) => "event_log",
            Error::Timeout(_) => "timeout",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

/// Extension trait for adding context to Results
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let original_error = e.into();
            Error::Other(anyhow::anyhow!("{}: {}", context.into(), original_error))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("inverted concurrency bounds");
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: inverted concurrency bounds"
        );
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::config("test").category(), "configuration");
        assert_eq!(Error::telemetry("test").category(), "telemetry");
        assert_eq!(Error::actuator("test").category(), "actuator");
        assert_eq!(Error::checkpoint("test").category(), "checkpoint");
    }

    #[test]
    fn test_error_classification() {
        let config_err = Error::config("missing command");
        assert!(config_err.is_config_error());
        assert!(!config_err.is_retryable());

        let telemetry_err = Error::telemetry("nvidia-smi unreachable");
        assert!(!telemetry_err.is_config_error());
        assert!(telemetry_err.is_retryable());
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let err = result.with_context("failed to open checkpoint").unwrap_err();

        assert!(matches!(err, Error::Other(_)));
        assert!(err.to_string().contains("failed to open checkpoint"));
        assert!(err.to_string().contains("file not found"));
    }
}
