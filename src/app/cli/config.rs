//! Pipeline configuration resolution
//!
//! Values come from three layers: built-in defaults, the TOML configuration
//! file and command line flags, each overriding the previous one.

use super::args::Args;
use crate::pipeline::api::{PipelineConfig, PipelineResult};
use std::path::PathBuf;

impl Args {
    /// Configuration file to load, if any
    ///
    /// An explicitly named file is always returned so that a missing file is
    /// reported. The default location is only used when it exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config_file {
            Some(path) => Some(path.clone()),
            None => PipelineConfig::default_path().filter(|path| path.exists()),
        }
    }

    /// Build the validated pipeline configuration
    pub async fn pipeline_config(&self) -> PipelineResult<PipelineConfig> {
        let mut config = match self.config_path() {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                PipelineConfig::load(&path).await?
            }
            None => PipelineConfig::default(),
        };

        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Apply command line values over `config`
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(value) = self.max_concurrency {
            config.max_concurrency = value;
        }
        if let Some(value) = self.timeout_ms {
            config.timeout_ms = value;
        }
        if let Some(value) = self.batch_timeout_ms {
            config.batch_timeout_ms = value;
        }
        if let Some(value) = self.max_retry_attempts {
            config.max_retry_attempts = value;
        }
        if let Some(value) = self.retry_delay_ms {
            config.retry_delay_ms = value;
        }
        if let Some(value) = self.channel_capacity {
            config.channel_capacity = value;
        }
        if self.max_batch_size.is_some() {
            config.max_batch_size = self.max_batch_size;
        }
    }
}
