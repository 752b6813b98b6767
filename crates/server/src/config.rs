use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use throttlegate_common::AppConfig;
use tracing::info;

/// Resolved configuration with the source path for reloading.
pub struct ServerSettings {
    pub config: AppConfig,
    pub config_path: PathBuf,
}

impl ServerSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");
        let config = AppConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        Ok(Self {
            config,
            config_path: path.to_path_buf(),
        })
    }

    /// Re-read the file. On failure the current configuration is kept.
    pub fn reload(&mut self) -> Result<&AppConfig> {
        info!(path = %self.config_path.display(), "reloading configuration");
        self.config = AppConfig::load(&self.config_path)
            .with_context(|| format!("failed to reload {}", self.config_path.display()))?;
        Ok(&self.config)
    }
}
