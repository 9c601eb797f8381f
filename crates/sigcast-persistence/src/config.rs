//! Persistence configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, PersistenceResult};

/// Sample archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Archive samples to disk.
    #[serde(default)]
    pub enabled: bool,
    /// Directory for sample and catalogue files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Samples buffered before a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Concurrent writer sessions.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_buffer_size() -> usize {
    256
}

fn default_pool_size() -> usize {
    10
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_dir: default_data_dir(),
            buffer_size: default_buffer_size(),
            pool_size: default_pool_size(),
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> PersistenceResult<()> {
        if self.buffer_size == 0 {
            return Err(PersistenceError::InvalidConfig(
                "buffer_size must be positive".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(PersistenceError::InvalidConfig(
                "pool_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
