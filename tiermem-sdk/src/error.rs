//! SDK Error Types
//!
//! Defines error types for the memory system.

use thiserror::Error;

/// SDK Result type alias
pub type SdkResult<T> = Result<T, SdkError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum SdkError {
    /// Store, codec or scoring error
    #[error(transparent)]
    Core(#[from] tiermem_core::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// A search callback failed; remaining delivery was aborted
    #[error("search callback failed: {0}")]
    SearchCallback(#[source] anyhow::Error),

    /// No registered chain of migrations connects two versions
    #[error("no migration path from {from} to {to}")]
    NoMigrationPath { from: String, to: String },

    /// Malformed schema version
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// A background scan task panicked or was cancelled
    #[error("task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// Create a no-migration-path error
    pub fn no_migration_path(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::NoMigrationPath {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create an invalid version error
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion(version.into())
    }

    /// Check if this error came from a consumer callback
    pub fn is_callback(&self) -> bool {
        matches!(self, Self::SearchCallback(_))
    }

    /// Check if this error was raised before anything touched disk
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Core(e) => e.is_validation(),
            Self::Config(_) | Self::InvalidVersion(_) => true,
            _ => false,
        }
    }

    /// Check if this error is an unresolvable migration
    pub fn is_no_migration_path(&self) -> bool {
        matches!(self, Self::NoMigrationPath { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SdkError::no_migration_path("1.0", "9.0");
        assert!(err.is_no_migration_path());
        assert!(err.to_string().contains("1.0"));
        assert!(err.to_string().contains("9.0"));

        let err = SdkError::SearchCallback(anyhow::anyhow!("sink closed"));
        assert!(err.is_callback());
        assert!(err.to_string().contains("sink closed"));

        let err: SdkError = tiermem_core::Error::validation("bad key").into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Validation failed: bad key");
    }
}
