//! Configuration management for tiermem.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (TIERMEM_*)
//! 2. Config file (`<data dir>/config.toml`)
//! 3. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tiermem_sdk::MemoryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// Memory system settings; a relative `base_path` is resolved
    /// against `paths.data_dir`
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for tiermem data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "tiermem", "tiermem") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tiermem")
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Config::default()
        };

        if let Ok(dir) = std::env::var("TIERMEM_DATA_DIR") {
            config.paths.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TIERMEM_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Memory settings with the base path resolved.
    pub fn memory_config(&self) -> MemoryConfig {
        let mut memory = self.memory.clone();
        if memory.base_path.is_relative() {
            memory.base_path = self.paths.data_dir.join(&memory.base_path);
        }
        memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_file_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[paths]
data_dir = "/srv/tiermem"

[memory]
short_term_ttl_secs = 600

[memory.search]
default_limit = 25
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        let memory = config.memory_config();

        assert_eq!(memory.base_path, PathBuf::from("/srv/tiermem/memory"));
        assert_eq!(memory.short_term_ttl_secs, 600);
        assert_eq!(memory.working_ttl_secs, 86400);
        assert_eq!(memory.search.default_limit, 25);
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn test_absolute_base_path_kept() {
        let mut config = Config::default();
        config.memory.base_path = PathBuf::from("/var/lib/tiermem");
        assert_eq!(config.memory_config().base_path, PathBuf::from("/var/lib/tiermem"));
    }

    #[test]
    fn test_from_file_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "memory = [").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
