//! Error types for Toolyard.

use thiserror::Error;

/// Main error type for Toolyard operations.
///
/// The guard and the memoization store never surface these to their callers;
/// they are produced by tier and configuration internals and handled at a
/// single point in each public operation.
#[derive(Error, Debug)]
pub enum ToolyardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted cache entry could not be decoded
    #[error("Corrupt cache entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// A cache key that cannot be used as a file stem
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

impl From<config::ConfigError> for ToolyardError {
    fn from(err: config::ConfigError) -> Self {
        ToolyardError::Config(err.to_string())
    }
}

/// Result type alias for Toolyard operations.
pub type Result<T> = std::result::Result<T, ToolyardError>;
