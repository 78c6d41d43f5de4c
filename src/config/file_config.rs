use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub user_id: Option<String>,

    // Feature configs
    pub engine: Option<EngineConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub max_records: Option<usize>,
    pub batch_chunk_size: Option<usize>,
    // Subscription retry settings
    pub max_retries: Option<u32>,
    pub initial_backoff_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_backoff_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub command_buffer: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_file() {
        let toml = r#"
            db_path = "/var/lib/notifications.db"
            user_id = "user-1"

            [engine]
            max_records = 50
            batch_chunk_size = 250
            max_retries = 5
            initial_backoff_secs = 1
            backoff_multiplier = 3.0
            max_backoff_secs = 30
            poll_interval_ms = 200
        "#;
        let config: FileConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.db_path.as_deref(), Some("/var/lib/notifications.db"));
        assert_eq!(config.user_id.as_deref(), Some("user-1"));
        let engine = config.engine.unwrap();
        assert_eq!(engine.max_records, Some(50));
        assert_eq!(engine.batch_chunk_size, Some(250));
        assert_eq!(engine.max_retries, Some(5));
        assert_eq!(engine.backoff_multiplier, Some(3.0));
        assert_eq!(engine.poll_interval_ms, Some(200));
        assert!(engine.command_buffer.is_none());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_path.is_none());
        assert!(config.engine.is_none());
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user_id = \"from-file\"").unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.user_id.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_records = [").unwrap();

        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
