//! Runtime configuration, loaded from TOML

use crate::error::ConfigError;
use crate::logging::LogSettings;
use crate::version::MAX_VERSION;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub domain: DomainConfig,

    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Newest schema version a registered class may declare
    #[serde(default = "default_max_version")]
    pub max_version: u8,

    /// How far ahead an update pass looks when nothing is scheduled
    #[serde(default = "default_update_horizon_secs")]
    pub update_horizon_secs: u64,

    /// zstd level for file storage
    #[serde(default = "default_compression_level")]
    pub file_compression_level: i32,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            max_version: MAX_VERSION,
            update_horizon_secs: default_update_horizon_secs(),
            file_compression_level: default_compression_level(),
        }
    }
}

impl DomainConfig {
    pub fn update_horizon(&self) -> Duration {
        Duration::from_secs(self.update_horizon_secs)
    }
}

fn default_max_version() -> u8 {
    MAX_VERSION
}

fn default_update_horizon_secs() -> u64 {
    365 * 24 * 60 * 60
}

fn default_compression_level() -> i32 {
    3
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        Ok(config.sanitized())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Clamp values the runtime cannot honour
    fn sanitized(mut self) -> Self {
        if self.domain.max_version > MAX_VERSION {
            crate::logging::warn!(
                event = "config_clamped",
                field = "domain.max_version",
                requested = self.domain.max_version,
                max = MAX_VERSION
            );
            self.domain.max_version = MAX_VERSION;
        }
        self.domain.file_compression_level = self.domain.file_compression_level.clamp(1, 22);
        self
    }
}
