//! Error types for pipeline operations

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Error types surfaced by the storage, generation and pipeline layers
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Local input/output errors (script output, temp files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Object storage request failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generation backend failures
    #[error("Generation error: {0}")]
    Generation(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Manifest or request (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stage coordination failures (queue closed, stage panicked)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new generation error
    pub fn generation<S: Into<String>>(msg: S) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new pipeline coordination error
    pub fn pipeline<S: Into<String>>(msg: S) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create storage error with operation and key context
    pub fn storage_op_error<E: std::fmt::Display>(operation: &str, key: &str, error: E) -> Self {
        Self::Storage(format!("Failed to {} '{}': {}", operation, key, error))
    }

    /// Create generation error with backend endpoint context
    pub fn generation_with_endpoint<E: std::fmt::Display>(
        endpoint: &str,
        operation: &str,
        error: E,
    ) -> Self {
        Self::Generation(format!("{} failed against '{}': {}", operation, endpoint, error))
    }

    /// Create configuration error with the accepted values
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }
}
