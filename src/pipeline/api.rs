//! Public API for the processing pipeline
//!
//! External modules should import from here rather than directly from
//! internal modules.

// Lifecycle
pub use crate::pipeline::lifecycle::{Pipeline, PipelineState};

// Submission
pub use crate::pipeline::channel::Submitter;

// Message types
pub use crate::pipeline::message::{Batch, MessageGroup, UpsertKind};

// Handler contract
pub use crate::pipeline::handler::{HandlerError, MessageHandler};

// Configuration
pub use crate::pipeline::config::{
    PipelineConfig, DEFAULT_BATCH_TIMEOUT_MS, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_MS,
};

// Error handling
pub use crate::pipeline::error::{PipelineError, PipelineResult, TaskError};

// Statistics and task outcomes
pub use crate::pipeline::stats::PipelineStats;
pub use crate::pipeline::task::TaskOutcome;
