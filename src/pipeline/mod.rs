//! Message Processing Pipeline
//!
//! Decouples the arrival of message groups from their processing. Groups are
//! collected into time-windowed batches and fanned out to an application
//! handler under a global concurrency ceiling, with a deadline and bounded
//! retries per group. A failing group never stops the stream.
//!
//! # Architecture
//!
//! ```text
//!  producers (Submitter clones)
//!        │ submit / submit_wait
//!        ▼
//! ┌──────────────────────┐   bounded mpsc
//! │  Ingestion Channel   │──────────────┐
//! └──────────────────────┘              ▼
//!                              ┌──────────────────┐
//!                              │     Batcher      │ window closes after
//!                              └────────┬─────────┘ batch_timeout_ms of quiet
//!                                       │ Batch
//!                                       ▼
//!                              ┌──────────────────┐
//!                              │     Executor     │ one task per group,
//!                              └────────┬─────────┘ max_concurrency slots
//!                          ┌────────────┼────────────┐
//!                          ▼            ▼            ▼
//!                      handler      handler      handler   deadline + retry
//! ```
//!
//! [`Pipeline`](api::Pipeline) owns all of it, together with the
//! cancellation root and the notification bus that every stage publishes to.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use msgflow::pipeline::api::{HandlerError, MessageGroup, Pipeline, PipelineConfig, UpsertKind};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handler = |group: Arc<MessageGroup>, _cancel: CancellationToken| async move {
//!     println!("{} message(s)", group.len());
//!     Ok::<(), HandlerError>(())
//! };
//!
//! let pipeline = Pipeline::start(PipelineConfig::default(), handler).await?;
//! pipeline.submit(MessageGroup::new(vec![serde_json::json!({"id": 1})], UpsertKind::Notify))?;
//! pipeline.destroy().await;
//! # Ok(())
//! # }
//! ```

// Internal modules - all access should go through api module
pub(crate) mod batcher;
pub(crate) mod channel;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod executor;
pub(crate) mod handler;
pub(crate) mod lifecycle;
pub(crate) mod message;
pub(crate) mod stats;
pub(crate) mod task;

// Public API module
pub mod api;

#[cfg(test)]
mod tests;
