//! Error types for tiermem-core.

use thiserror::Error;

/// Result type alias using tiermem-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for tier store operations.
///
/// Absent keys are never errors: lookups return `Ok(None)` and removals
/// return `Ok(false)`.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    // Codec errors
    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Malformed envelope: {0}")]
    Decode(String),

    // Migration errors
    #[error("Transform failed: {0}")]
    Transform(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a transform error
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform(message.into())
    }

    /// Check if this error was raised before anything touched disk
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidPattern(_))
    }
}
