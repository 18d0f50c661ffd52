//! Configuration file support for vaultos.
//!
//! Reads configuration from `~/.config/vaultos/config.toml`. Every key is
//! optional.
//!
//! ## Example config
//!
//! ```toml
//! [image]
//! repository = "lscr.io/linuxserver/webtop"
//!
//! [sweep]
//! interval_secs = 1
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::image::DEFAULT_REPOSITORY;

/// Base image settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Repository holding the desktop variants.
    #[serde(default = "default_repository")]
    pub repository: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
        }
    }
}

fn default_repository() -> String {
    DEFAULT_REPOSITORY.to_string()
}

/// Expiry sweeper settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    1
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error only if file exists but is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_path();
        if !config_path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::info!("Loaded config from {:?}", path);
        tracing::info!("  image.repository = {:?}", config.image.repository);
        tracing::info!("  sweep.interval_secs = {}", config.sweep.interval_secs);

        Ok(config)
    }

    /// Default config file path: `~/.config/vaultos/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vaultos")
            .join("config.toml")
    }

    /// Sweep cadence, never below one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.interval_secs.max(1))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.image.repository, "lscr.io/linuxserver/webtop");
        assert_eq!(config.sweep.interval_secs, 1);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[image]
repository = "registry.local:5000/webtop"

[sweep]
interval_secs = 30
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.image.repository, "registry.local:5000/webtop");
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config: Config = toml::from_str("[sweep]\ninterval_secs = 0\n").unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sweep]\ninterval_secs = 5").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.sweep.interval_secs, 5);
        assert_eq!(config.image.repository, "lscr.io/linuxserver/webtop");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sweep\ninterval_secs = ").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_default_path() {
        let path = Config::default_path();
        assert!(path.ends_with("vaultos/config.toml"));
    }
}
