//! Config store for loading and saving config.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{LoaderConfig, parser};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store at the platform config directory (`<config_dir>/toolgraph/config.toml`).
    pub fn from_default_dir() -> anyhow::Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("toolgraph");

        Ok(Self::from_path(config_dir.join("config.toml")))
    }

    pub fn from_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config file, falling back to defaults when it is missing.
    /// Environment overrides are applied last.
    pub fn load(&self) -> anyhow::Result<LoaderConfig> {
        let mut config = if self.config_path.exists() {
            parser::parse_config(&self.config_path)?
        } else {
            tracing::debug!(path = %self.config_path.display(), "no config file, using defaults");
            LoaderConfig::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &LoaderConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
