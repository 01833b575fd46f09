//! Configuration management for sluice.
//!
//! Configuration is read from `~/.config/sluice/config.toml` at startup,
//! or from an explicit path. If the default file doesn't exist, one with
//! comments is created.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::feed::DEFAULT_UPDATE_INTERVAL;
use crate::fetcher::parallel::DEFAULT_WORKERS;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub fetcher: FetcherConfig,
    pub feeds: FeedsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `<data_dir>/sluice/sluice.db`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub timeout_secs: u64,
    pub workers: usize,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            workers: DEFAULT_WORKERS,
            user_agent: concat!("sluice/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    /// Seconds between cycles for newly added feeds.
    pub default_update_interval: i64,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            default_update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "sluice=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/sluice/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("sluice").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> &'static str {
        r##"# sluice configuration

[database]
# SQLite database file. Defaults to <data_dir>/sluice/sluice.db
# path = "/var/lib/sluice/sluice.db"

[fetcher]
# Per-request timeout in seconds
timeout_secs = 10

# Maximum concurrent fetches during `sluice update`
workers = 10

user_agent = "sluice/0.1.0"

[feeds]
# Seconds between cycles for newly added feeds
default_update_interval = 3600

[logging]
# tracing filter, overridden by RUST_LOG
filter = "sluice=info"
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let config: Config =
            toml::from_str(Config::default_config_content()).expect("Default config should be valid TOML");

        assert!(config.database.path.is_none());
        assert_eq!(config.fetcher.timeout_secs, 10);
        assert_eq!(config.fetcher.workers, 10);
        assert_eq!(config.feeds.default_update_interval, 3600);
        assert_eq!(config.logging.filter, "sluice=info");
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[fetcher]
workers = 3
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.fetcher.workers, 3);
        assert_eq!(config.fetcher.timeout_secs, 10);
        assert_eq!(config.feeds.default_update_interval, DEFAULT_UPDATE_INTERVAL);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.logging.filter, "sluice=info");
        assert!(config.fetcher.user_agent.starts_with("sluice/"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[database]\npath = \"/tmp/feeds.db\"\n[feeds]\ndefault_update_interval = 900\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/feeds.db")));
        assert_eq!(config.feeds.default_update_interval, 900);
    }

    #[test]
    fn test_load_from_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[fetcher\nworkers = ").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_create_default_config_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::create_default_config(&path).unwrap();
        assert!(Config::load_from(&path).is_ok());
    }
}
