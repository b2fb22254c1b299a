//! Engine configuration
//!
//! Loaded from a single JSON file. Every field except `data_dir` has a
//! default; `validate` runs on every load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Table data, index files and block outputs live under this directory
    pub data_dir: PathBuf,

    /// Entries per top-level index slot
    #[serde(default = "default_index_load_factor")]
    pub index_load_factor: u32,

    /// Rewrites the global optimizer may apply to one plan
    #[serde(default = "default_optimizer_max_rewrites")]
    pub optimizer_max_rewrites: usize,

    /// Largest input (in rows) the optimizer will broadcast
    #[serde(default = "default_broadcast_threshold_rows")]
    pub broadcast_threshold_rows: u64,

    /// Reject out-of-order keys while building an index
    #[serde(default = "default_verify_index_order")]
    pub verify_index_order: bool,
}

fn default_index_load_factor() -> u32 {
    100
}

fn default_optimizer_max_rewrites() -> usize {
    64
}

fn default_broadcast_threshold_rows() -> u64 {
    10_000
}

fn default_verify_index_order() -> bool {
    cfg!(debug_assertions)
}

impl EngineConfig {
    /// Defaults rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            index_load_factor: default_index_load_factor(),
            optimizer_max_rewrites: default_optimizer_max_rewrites(),
            broadcast_threshold_rows: default_broadcast_threshold_rows(),
            verify_index_order: default_verify_index_order(),
        }
    }

    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", &path.display().to_string()),
                ("data_dir", &config.data_dir.display().to_string()),
            ],
        );
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.index_load_factor == 0 {
            return Err(ConfigError::Invalid("index_load_factor must be > 0".into()));
        }
        if self.optimizer_max_rewrites == 0 {
            return Err(ConfigError::Invalid(
                "optimizer_max_rewrites must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Default data file of a table
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{}.rows", table))
    }

    pub fn index_path(&self, index: &str) -> PathBuf {
        self.data_dir.join(format!("{}.idx", index))
    }

    /// Directory holding the block outputs of one query
    pub fn query_dir(&self, query: &str) -> PathBuf {
        self.data_dir.join("queries").join(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_applied() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tessera.json");
        fs::write(&path, r#"{"data_dir": "/var/lib/tessera"}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.index_load_factor, 100);
        assert_eq!(config.optimizer_max_rewrites, 64);
        assert_eq!(config.broadcast_threshold_rows, 10_000);
        assert_eq!(config, EngineConfig::new("/var/lib/tessera"));
    }

    #[test]
    fn test_zero_load_factor_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tessera.json");
        fs::write(&path, r#"{"data_dir": "d", "index_load_factor": 0}"#).unwrap();

        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            EngineConfig::load(&dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_paths() {
        let config = EngineConfig::new("/data");
        assert_eq!(config.table_path("emp"), PathBuf::from("/data/emp.rows"));
        assert_eq!(config.index_path("emp_dept"), PathBuf::from("/data/emp_dept.idx"));
        assert_eq!(config.query_dir("q_1"), PathBuf::from("/data/queries/q_1"));
    }
}
