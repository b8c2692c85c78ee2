// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration persistence (save/load).

use crate::config::AppConfig;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to determine config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Manages configuration file persistence.
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a config manager rooted at the platform config directory.
    pub fn new() -> Result<Self, ConfigError> {
        let project_dirs = ProjectDirs::from("", "", "volmix").ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::with_dir(project_dirs.config_dir()))
    }

    /// Create a config manager rooted at an explicit directory.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Get the path to the main config file.
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Load the application config, or defaults when no file exists.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        Self::load_from(&self.config_path())
    }

    /// Load a config file at an arbitrary path, or defaults when absent.
    pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = fs::read_to_string(path)?;
            let config = AppConfig::from_toml(&content)?;
            config.validate().map_err(ConfigError::Invalid)?;
            Ok(config)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(AppConfig::default())
        }
    }

    /// Save the application config, creating the directory if needed.
    pub fn save_config(&self, config: &AppConfig) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir)?;
        let content = config.to_toml()?;
        fs::write(self.config_path(), content)?;
        Ok(())
    }
}
