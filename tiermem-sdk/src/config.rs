//! SDK Configuration
//!
//! Defines configuration options for the memory system.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use tiermem_core::CompressionConfig;
use tiermem_core::validation::validate_version;

/// Memory system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Root directory holding one subdirectory per tier
    pub base_path: PathBuf,

    /// Short-term memory TTL in seconds (default: 3600 = 1 hour)
    pub short_term_ttl_secs: u64,

    /// Working memory TTL in seconds (default: 86400 = 24 hours)
    pub working_ttl_secs: u64,

    /// Maintenance loop interval in seconds (default: 3600 = 1 hour)
    pub maintenance_interval_secs: u64,

    /// Schema version stamped on new long-term items (default: "1.0")
    pub schema_version: String,

    /// Search defaults
    pub search: SearchConfig,

    /// Compressor settings
    pub compression: CompressionConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("memory"),
            short_term_ttl_secs: 3600,   // 1 hour
            working_ttl_secs: 86400,     // 24 hours
            maintenance_interval_secs: 3600,
            schema_version: "1.0".into(),
            search: SearchConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result limit when the caller gives none (default: 10)
    pub default_limit: usize,

    /// Minimum score for fan-out search when the caller gives none (default: 0.5)
    pub default_min_score: f64,

    /// Similarity a structured field needs to count as matched (default: 0.7)
    pub structured_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_min_score: 0.5,
            structured_threshold: 0.7,
        }
    }
}

impl MemoryConfig {
    /// Create a config rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// Set the TTLs in seconds
    pub fn with_ttls(mut self, short_term_secs: u64, working_secs: u64) -> Self {
        self.short_term_ttl_secs = short_term_secs;
        self.working_ttl_secs = working_secs;
        self
    }

    /// Set the maintenance interval in seconds
    pub fn with_maintenance_interval(mut self, secs: u64) -> Self {
        self.maintenance_interval_secs = secs;
        self
    }

    /// Set the schema version
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Set search configuration
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Set compression configuration
    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn short_term_ttl(&self) -> Duration {
        Duration::from_secs(self.short_term_ttl_secs)
    }

    pub fn working_ttl(&self) -> Duration {
        Duration::from_secs(self.working_ttl_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.base_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingBasePath);
        }

        for (field, value) in [
            ("short_term_ttl_secs", self.short_term_ttl_secs),
            ("working_ttl_secs", self.working_ttl_secs),
            ("maintenance_interval_secs", self.maintenance_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        }

        if validate_version(&self.schema_version).is_err() {
            return Err(ConfigValidationError::InvalidValue {
                field: "schema_version".into(),
                message: format!("'{}' is not Major.Minor[.Patch]", self.schema_version),
            });
        }

        if self.search.default_limit == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "search.default_limit".into(),
                message: "must be greater than 0".into(),
            });
        }

        for (field, value) in [
            ("search.default_min_score", self.search.default_min_score),
            ("search.structured_threshold", self.search.structured_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.into(),
                    message: "must be between 0 and 1".into(),
                });
            }
        }

        if self.compression.level > 9 {
            return Err(ConfigValidationError::InvalidValue {
                field: "compression.level".into(),
                message: "must be between 0 and 9".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("base_path is required")]
    MissingBasePath,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
