//! Configuration error types

/// Errors raised while loading or validating an [`EngineConfig`].
///
/// [`EngineConfig`]: super::EngineConfig
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO-related errors (file access, permissions, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation errors
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Configuration file not found
    #[error("Configuration not found: {0}")]
    NotFound(String),
}

impl ConfigError {
    /// Create a validation error with context
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error with context
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
