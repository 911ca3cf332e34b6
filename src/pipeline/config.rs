//! Pipeline configuration
//!
//! Configuration is resolved once, validated at mount time and never changes
//! afterwards. Every field is optional when deserialised; missing values fall
//! back to the defaults below. TOML files keep the settings under a
//! `[pipeline]` table:
//!
//! ```toml
//! [pipeline]
//! max_concurrency = 8
//! timeout_ms = 10000
//! batch_timeout_ms = 500
//! ```

use crate::core::retry::RetryPolicy;
use crate::pipeline::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Immutable pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Name used in logs and lifecycle events
    pub name: String,

    /// Maximum number of handler invocations running at once
    #[serde(alias = "maxConcurrency")]
    pub max_concurrency: usize,

    /// Deadline for a single handler invocation
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: u64,

    /// Quiet period that closes a batching window
    #[serde(alias = "batchTimeoutMs")]
    pub batch_timeout_ms: u64,

    /// Total attempts per group, including the first
    #[serde(alias = "maxRetryAttempts")]
    pub max_retry_attempts: u32,

    /// Fixed pause between a failed attempt and the next one
    #[serde(alias = "retryDelayMs")]
    pub retry_delay_ms: u64,

    /// Number of groups the ingestion channel buffers before rejecting
    #[serde(alias = "channelCapacity")]
    pub channel_capacity: usize,

    /// Flush a window early once it holds this many groups
    #[serde(alias = "maxBatchSize")]
    pub max_batch_size: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "msgflow".to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            batch_timeout_ms: DEFAULT_BATCH_TIMEOUT_MS,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_batch_size: None,
        }
    }
}

/// Layout of a configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    pipeline: PipelineConfig,
}

impl PipelineConfig {
    /// Check every value is usable
    pub fn validate(&self) -> PipelineResult<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::invalid_config("name cannot be empty"));
        }
        if self.max_concurrency == 0 {
            return Err(PipelineError::invalid_config(
                "max_concurrency must be greater than 0",
            ));
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(PipelineError::invalid_config(format!(
                "max_concurrency cannot exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.timeout_ms == 0 {
            return Err(PipelineError::invalid_config(
                "timeout_ms must be greater than 0",
            ));
        }
        if self.batch_timeout_ms == 0 {
            return Err(PipelineError::invalid_config(
                "batch_timeout_ms must be greater than 0",
            ));
        }
        if self.max_retry_attempts == 0 {
            return Err(PipelineError::invalid_config(
                "max_retry_attempts must be at least 1",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PipelineError::invalid_config(
                "channel_capacity must be greater than 0",
            ));
        }
        if self.max_batch_size == Some(0) {
            return Err(PipelineError::invalid_config(
                "max_batch_size must be greater than 0 when set",
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            delay: self.retry_delay(),
            attempt_timeout: self.timeout(),
        }
    }

    /// Longest time a group can spend between submission and its terminal
    /// outcome, ignoring time spent waiting for a concurrency slot
    pub fn worst_case_latency(&self) -> Duration {
        let attempts = self.max_retry_attempts;
        self.batch_window()
            + self.timeout() * attempts
            + self.retry_delay() * attempts.saturating_sub(1)
    }

    /// Parse a TOML document containing a `[pipeline]` table
    pub fn from_toml_str(contents: &str) -> PipelineResult<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| PipelineError::invalid_config(format!("TOML parse error: {}", e)))?;
        file.pipeline.validate()?;
        Ok(file.pipeline)
    }

    /// Load and validate a configuration file
    pub async fn load(path: &Path) -> PipelineResult<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::invalid_config(format!(
                "Cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            PipelineError::InvalidConfig { message } => {
                PipelineError::invalid_config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Location of the per-user configuration file, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Msgflow").join("msgflow.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.batch_timeout_ms, 1_000);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.retry_delay_ms, 1_000);
        assert_eq!(config.max_batch_size, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [pipeline]
            max_concurrency = 12
            retry_delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrency, 12);
        assert_eq!(config.retry_delay_ms, 250);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.batch_timeout_ms, DEFAULT_BATCH_TIMEOUT_MS);
    }

    #[test]
    fn test_camel_case_aliases_accepted() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [pipeline]
            maxConcurrency = 2
            timeoutMs = 100
            batchTimeoutMs = 10
            maxRetryAttempts = 1
            retryDelayMs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.timeout_ms, 100);
        assert_eq!(config.batch_timeout_ms, 10);
        assert_eq!(config.max_retry_attempts, 1);
        assert_eq!(config.retry_delay_ms, 0);
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = PipelineConfig::from_toml_str(
            r#"
            [pipeline]
            max_concurency = 3
            "#,
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let cases: Vec<(&str, PipelineConfig)> = vec![
            (
                "max_concurrency",
                PipelineConfig {
                    max_concurrency: 0,
                    ..Default::default()
                },
            ),
            (
                "timeout_ms",
                PipelineConfig {
                    timeout_ms: 0,
                    ..Default::default()
                },
            ),
            (
                "batch_timeout_ms",
                PipelineConfig {
                    batch_timeout_ms: 0,
                    ..Default::default()
                },
            ),
            (
                "max_retry_attempts",
                PipelineConfig {
                    max_retry_attempts: 0,
                    ..Default::default()
                },
            ),
            (
                "channel_capacity",
                PipelineConfig {
                    channel_capacity: 0,
                    ..Default::default()
                },
            ),
            (
                "max_batch_size",
                PipelineConfig {
                    max_batch_size: Some(0),
                    ..Default::default()
                },
            ),
        ];

        for (field, config) in cases {
            match config.validate() {
                Err(PipelineError::InvalidConfig { message }) => {
                    assert!(message.contains(field), "{} not in '{}'", field, message)
                }
                other => panic!("Expected InvalidConfig for {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_zero_retry_delay_is_allowed() {
        let config = PipelineConfig {
            retry_delay_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_and_latency_budget() {
        let config = PipelineConfig {
            timeout_ms: 100,
            batch_timeout_ms: 50,
            max_retry_attempts: 3,
            retry_delay_ms: 20,
            ..Default::default()
        };

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(20));
        assert_eq!(policy.attempt_timeout, Duration::from_millis(100));

        // 50 + 3 * 100 + 2 * 20
        assert_eq!(config.worst_case_latency(), Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_load_reports_path_on_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("msgflow.toml");
        std::fs::write(&path, "[pipeline]\nmax_concurrency = 0\n").unwrap();

        match PipelineConfig::load(&path).await {
            Err(PipelineError::InvalidConfig { message }) => {
                assert!(message.contains("msgflow.toml"));
                assert!(message.contains("max_concurrency"));
            }
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = PipelineConfig::load(&dir.path().join("absent.toml")).await;
        assert!(matches!(result, Err(PipelineError::InvalidConfig { .. })));
    }
}
