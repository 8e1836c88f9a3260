use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::OpenerError;
use crate::filter::{ClassNameFilter, DEFAULT_DISALLOWED_PACKAGES};

/// Number of classes rewritten and loaded together.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Settings of an [`crate::opener::ArchiveClassSource`].
///
/// Every field is optional in JSON:
///
/// ```json
/// { "batch_size": 50, "cache_dir": "/data/data/foo/code_cache/dexopener" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpenerConfig {
    pub batch_size: usize,
    pub disallowed_packages: Vec<String>,
    pub cache_dir: PathBuf,
}

impl Default for OpenerConfig {
    fn default() -> Self {
        OpenerConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            disallowed_packages: DEFAULT_DISALLOWED_PACKAGES.iter().map(|p| p.to_string()).collect(),
            cache_dir: std::env::temp_dir().join("dexopener"),
        }
    }
}

impl OpenerConfig {
    /// Caches under the application's `code_cache/dexopener` directory.
    pub fn for_data_dir(data_dir: impl AsRef<Path>) -> OpenerConfig {
        OpenerConfig {
            cache_dir: data_dir.as_ref().join("code_cache").join("dexopener"),
            ..OpenerConfig::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<OpenerConfig, OpenerError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: OpenerConfig = serde_json::from_str(&raw).map_err(|e| {
            OpenerError::illegal_state(format!("invalid config {}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OpenerError> {
        if self.batch_size == 0 {
            return Err(OpenerError::illegal_state("batch_size must be at least 1"));
        }
        Ok(())
    }

    pub fn filter(&self) -> ClassNameFilter {
        ClassNameFilter::new(self.disallowed_packages.iter().cloned())
    }
}
