//! Application configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sigcast_feed::FeedConfig;
use sigcast_gateway::GatewayConfig;
use sigcast_hub::HubConfig;
use sigcast_persistence::PersistenceConfig;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Simulated signals and aggregation.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Connection pumps and hub dispatch.
    #[serde(default)]
    pub hub: HubConfig,
    /// WebSocket listener.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Sample archive.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load from `path`, falling back to defaults when the file is missing
    /// and the path was not given explicitly.
    pub fn load(path: impl AsRef<Path>, explicit: bool) -> AppResult<Self> {
        let path = path.as_ref();
        if !explicit && !path.exists() {
            info!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Validate every section.
    pub fn validate(&self) -> AppResult<()> {
        self.feed.validate()?;
        self.hub.validate()?;
        self.persistence.validate()?;
        Ok(())
    }
}
