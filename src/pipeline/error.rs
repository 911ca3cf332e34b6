//! Pipeline Error Types
//!
//! Two families of errors exist. [`TaskError`] describes what happened to a
//! single processing task and never leaves the executor except through logs
//! and notification events. [`PipelineError`] is returned to callers of the
//! pipeline itself (submission, mount, configuration).

use std::time::Duration;

/// Failure of a single processing task
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    /// The handler did not complete before the attempt deadline
    #[error("Task timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The handler returned an error or panicked
    #[error("Handler failed: {message}")]
    Handler { message: String },

    /// Every allowed attempt failed; the group is discarded
    #[error("Retries exhausted after {attempts} attempts (last error: {last_error})")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<TaskError>,
    },
}

impl TaskError {
    pub fn timeout(deadline: Duration) -> Self {
        TaskError::Timeout {
            timeout_ms: deadline.as_millis() as u64,
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        TaskError::Handler {
            message: message.into(),
        }
    }

    /// Whether another attempt may be made after this failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TaskError::RetryExhausted { .. })
    }
}

/// Errors surfaced to users of the pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline is closed")]
    Closed,

    #[error("Ingestion channel is full (capacity: {capacity})")]
    ChannelFull { capacity: usize },

    #[error("Pipeline has not been mounted")]
    NotMounted,

    #[error("Pipeline is already mounted")]
    AlreadyMounted,

    #[error("Pipeline has terminated and cannot be mounted again")]
    NotRestartable,

    #[error("Invalid pipeline configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Pipeline fatal error: {message}")]
    Fatal { message: String },
}

impl PipelineError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        PipelineError::Fatal {
            message: message.into(),
        }
    }
}

impl crate::core::error_handling::ContextualError for PipelineError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, PipelineError::InvalidConfig { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            PipelineError::InvalidConfig { message } => Some(message),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
