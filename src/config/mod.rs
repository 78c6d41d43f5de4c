mod file_config;

pub use file_config::{EngineConfig, FileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::MAX_BATCH_OPERATIONS;
use crate::listener::RetryPolicy;
use crate::source::DEFAULT_POLL_INTERVAL;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub user_id: String,
    pub engine: EngineSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db or in config file")
            })?;

        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let user_id = file
            .user_id
            .or_else(|| cli.user_id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("user_id must be specified via --user or in config file")
            })?;

        let engine = EngineSettings::from_file(file.engine.unwrap_or_default())?;

        Ok(Self {
            db_path,
            user_id,
            engine,
        })
    }
}

/// Tunables of the notification engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Subscription limit and in-memory cap.
    pub max_records: usize,
    pub batch_chunk_size: usize,
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_secs: u64,
    pub poll_interval_ms: u64,
    pub command_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_records: 100,
            batch_chunk_size: MAX_BATCH_OPERATIONS,
            max_retries: 3,
            initial_backoff_secs: 2,
            backoff_multiplier: 2.0,
            max_backoff_secs: 60,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            command_buffer: 64,
        }
    }
}

impl EngineSettings {
    /// Merge `[engine]` file values over the defaults and validate the result.
    pub fn from_file(config: EngineConfig) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            max_records: config.max_records.unwrap_or(defaults.max_records),
            batch_chunk_size: config.batch_chunk_size.unwrap_or(defaults.batch_chunk_size),
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            initial_backoff_secs: config
                .initial_backoff_secs
                .unwrap_or(defaults.initial_backoff_secs),
            backoff_multiplier: config
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            max_backoff_secs: config.max_backoff_secs.unwrap_or(defaults.max_backoff_secs),
            poll_interval_ms: config.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            command_buffer: config.command_buffer.unwrap_or(defaults.command_buffer),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            bail!("max_records must be greater than zero");
        }
        if self.batch_chunk_size == 0 || self.batch_chunk_size > MAX_BATCH_OPERATIONS {
            bail!(
                "batch_chunk_size must be between 1 and {}, got {}",
                MAX_BATCH_OPERATIONS,
                self.batch_chunk_size
            );
        }
        if !(self.backoff_multiplier > 0.0) {
            bail!(
                "backoff_multiplier must be positive, got {}",
                self.backoff_multiplier
            );
        }
        if self.command_buffer == 0 {
            bail!("command_buffer must be greater than zero");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.max_records, 100);
        assert_eq!(settings.batch_chunk_size, 500);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.initial_backoff_secs, 2);
        assert_eq!(settings.backoff_multiplier, 2.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_resolve_cli_only() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/tmp/notifications.db")),
            user_id: Some("user-1".to_string()),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/notifications.db"));
        assert_eq!(config.user_id, "user-1");
        assert_eq!(config.engine, EngineSettings::default());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/should/be/overridden.db")),
            user_id: Some("cli-user".to_string()),
        };

        let file_config = FileConfig {
            db_path: Some("/toml/notifications.db".to_string()),
            engine: Some(EngineConfig {
                max_records: Some(20),
                max_retries: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.db_path, PathBuf::from("/toml/notifications.db"));
        assert_eq!(config.engine.max_records, 20);
        assert_eq!(config.engine.max_retries, 1);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.user_id, "cli-user");
        assert_eq!(config.engine.batch_chunk_size, 500);
    }

    #[test]
    fn test_resolve_missing_db_path_error() {
        let cli = CliConfig {
            user_id: Some("user-1".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_path must be specified"));
    }

    #[test]
    fn test_resolve_missing_user_error() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/tmp/n.db")),
            user_id: Some(String::new()),
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("user_id must be specified"));
    }

    #[test]
    fn test_resolve_db_path_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().to_path_buf()),
            user_id: Some("user-1".to_string()),
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("is a directory"));
    }

    #[test]
    fn test_chunk_size_out_of_range() {
        for size in [0, 501] {
            let result = EngineSettings::from_file(EngineConfig {
                batch_chunk_size: Some(size),
                ..Default::default()
            });
            assert!(result.unwrap_err().to_string().contains("batch_chunk_size"));
        }
    }

    #[test]
    fn test_zero_max_records_rejected() {
        let result = EngineSettings::from_file(EngineConfig {
            max_records: Some(0),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_non_positive_multiplier_rejected() {
        for multiplier in [0.0, -1.0, f64::NAN] {
            let result = EngineSettings::from_file(EngineConfig {
                backoff_multiplier: Some(multiplier),
                ..Default::default()
            });
            assert!(result.is_err(), "multiplier {multiplier}");
        }
    }
}
