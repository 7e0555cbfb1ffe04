//! Loader configuration.
//!
//! Configuration is read from `<config_dir>/toolgraph/config.toml` and
//! may be overridden through environment variables:
//! - `TOOLGRAPH_DEFAULT_MODEL`
//! - `TOOLGRAPH_WORKING_DIR`

pub mod parser;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use store::ConfigStore;

pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Settings shared by the fetcher and the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Model assigned to tools that do not name one
    pub default_model: String,

    /// User agent sent with remote fetches
    pub user_agent: String,

    /// Per-request timeout for remote fetches, in seconds
    pub request_timeout: u64,

    /// Upper bound for a whole load, in seconds
    pub resolve_timeout: Option<u64>,

    /// Base for relative root references (defaults to the current directory)
    pub working_dir: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            user_agent: format!("toolgraph/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: 30,
            resolve_timeout: None,
            working_dir: None,
        }
    }
}

impl LoaderConfig {
    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("TOOLGRAPH_DEFAULT_MODEL").filter(|v| !v.is_empty()) {
            self.default_model = model;
        }
        if let Some(dir) = lookup("TOOLGRAPH_WORKING_DIR").filter(|v| !v.is_empty()) {
            self.working_dir = Some(PathBuf::from(dir));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_model.trim().is_empty() {
            anyhow::bail!("default_model must not be empty");
        }
        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be at least 1 second");
        }
        if self.resolve_timeout == Some(0) {
            anyhow::bail!("resolve_timeout must be at least 1 second");
        }
        Ok(())
    }

    pub fn resolve_timeout(&self) -> Option<Duration> {
        self.resolve_timeout.map(Duration::from_secs)
    }
}
