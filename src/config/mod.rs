use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "ledgerline.yml";

/// Fully resolved pipeline configuration. Every field has a default so a
/// missing config file still yields a working local setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory scanned for dropped transaction files.
    pub drop_dir: PathBuf,
    /// SQLite database holding the loaded transactions.
    pub db_path: PathBuf,
    /// JSON ledger of already-consumed source files.
    pub tracker_path: PathBuf,
    /// File extensions eligible for ingestion.
    pub extensions: Vec<String>,
    /// Glob patterns excluded from the scan.
    pub exclude: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drop_dir: PathBuf::from("data/drop"),
            db_path: PathBuf::from("data/transactions.sqlite"),
            tracker_path: PathBuf::from("data/ingested-files.json"),
            extensions: vec![".csv".to_string(), ".json".to_string()],
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    drop_dir: Option<PathBuf>,
    #[serde(default)]
    db_path: Option<PathBuf>,
    #[serde(default)]
    tracker_path: Option<PathBuf>,
    #[serde(default)]
    extensions: Option<Vec<String>>,
    #[serde(default)]
    exclude: Option<Vec<String>>,
}

impl RawConfig {
    fn into_config(self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            drop_dir: self.drop_dir.unwrap_or(defaults.drop_dir),
            db_path: self.db_path.unwrap_or(defaults.db_path),
            tracker_path: self.tracker_path.unwrap_or(defaults.tracker_path),
            extensions: self.extensions.unwrap_or(defaults.extensions),
            exclude: self.exclude.unwrap_or(defaults.exclude),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Loads the config file if it exists; otherwise returns the defaults.
/// Unset keys in the file fall back to their defaults individually.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let raw: RawConfig = serde_yaml::from_str(&content)?;
    Ok(raw.into_config())
}

pub fn default_config_yaml() -> String {
    r#"drop_dir: data/drop
db_path: data/transactions.sqlite
tracker_path: data/ingested-files.json
extensions:
  - .csv
  - .json
exclude: []
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join(DEFAULT_CONFIG_FILE)).expect("load");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_unset_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"drop_dir: /srv/drops
exclude:
  - "**/archive-*"
"#,
        )
        .expect("write config");

        let config = load_config(&path).expect("load");
        assert_eq!(config.drop_dir, PathBuf::from("/srv/drops"));
        assert_eq!(config.db_path, PipelineConfig::default().db_path);
        assert_eq!(config.exclude, vec!["**/archive-*".to_string()]);
    }

    #[test]
    fn default_yaml_round_trips_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, default_config_yaml()).expect("write config");
        let config = load_config(&path).expect("load");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn rejects_unparsable_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "drop_dir: [unclosed").expect("write config");
        assert!(matches!(load_config(&path), Err(ConfigError::Yaml(_))));
    }
}
