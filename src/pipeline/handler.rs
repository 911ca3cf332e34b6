//! Handler contract
//!
//! The handler is the application code that consumes message groups. It runs
//! under at-least-once semantics: after a failure or a timeout the same group
//! is handed over again, so handlers must tolerate repeated invocation and
//! must not rely on ordering relative to other groups.
//!
//! When an attempt exceeds its deadline the pipeline cancels the token passed
//! to that invocation and drops the handler future. Work the handler spawned
//! onto the runtime is not dropped with it and keeps running until it checks
//! the token or finishes on its own.

use crate::pipeline::message::MessageGroup;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Error type returned by handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Asynchronous consumer of message groups
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one group
    ///
    /// `cancel` fires when this attempt timed out or the pipeline was destroyed.
    async fn handle(
        &self,
        group: Arc<MessageGroup>,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Arc<MessageGroup>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(
        &self,
        group: Arc<MessageGroup>,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        self(group, cancel).await
    }
}
