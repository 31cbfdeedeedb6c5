//! ABOUTME: Configuration-specific error type
//! ABOUTME: Kept distinct from AgentError::Fatal so callers can name the field that failed

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
