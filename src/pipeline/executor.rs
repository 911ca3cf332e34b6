//! Concurrency-Limited Executor
//!
//! Receives batches from the batcher and turns every group into its own
//! spawned processing task. A single semaphore with `max_concurrency`
//! permits bounds handler invocations across the whole pipeline, whichever
//! batch a group came from. Permits are taken in batch order and held only
//! for the duration of one invocation, so a task waiting out its retry
//! delay does not occupy a slot.
//!
//! Each task is isolated: its failures, timeouts and panics end in logs and
//! notification events and never reach the dispatch loop or other tasks.
//! Only a fault in the dispatch machinery itself is returned as
//! [`PipelineError::Fatal`].

use crate::core::retry::{attempt_with_deadline, AttemptFailure, RetryPolicy};
use crate::notifications::api::{
    BatchEvent, BatchEventType, Event, Notifier, TaskEvent, TaskEventType,
};
use crate::pipeline::error::{PipelineError, PipelineResult, TaskError};
use crate::pipeline::handler::MessageHandler;
use crate::pipeline::message::{Batch, MessageGroup};
use crate::pipeline::stats::StatsCollector;
use crate::pipeline::task::{ProcessingTask, TaskOutcome};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Result of a single handler invocation
enum Attempt {
    Completed,
    Failed(TaskError),
    /// The pipeline was torn down while the handler was running
    Cancelled,
}

pub(crate) struct Executor {
    handler: Arc<dyn MessageHandler>,
    policy: RetryPolicy,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
    notifier: Notifier,
    stats: Arc<StatsCollector>,
}

impl Executor {
    pub fn new(
        handler: Arc<dyn MessageHandler>,
        policy: RetryPolicy,
        slots: Arc<Semaphore>,
        cancel: CancellationToken,
        notifier: Notifier,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            handler,
            policy,
            slots,
            cancel,
            notifier,
            stats,
        }
    }

    /// Dispatch loop; runs until the pipeline is cancelled
    pub async fn run(self: Arc<Self>, mut batches: mpsc::Receiver<Batch>) -> PipelineResult<()> {
        log::debug!(
            "Executor started ({} slots, {} attempts, {}ms deadline)",
            self.slots.available_permits(),
            self.policy.max_attempts,
            self.policy.attempt_timeout.as_millis()
        );

        loop {
            let batch = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = batches.recv() => match received {
                    Some(batch) => batch,
                    None if self.cancel.is_cancelled() => break,
                    None => return Err(PipelineError::fatal("batcher stopped delivering batches")),
                },
            };

            if !self.clone().dispatch(batch).await? {
                break;
            }
        }

        self.drain(&mut batches);
        log::debug!("Executor stopped");
        Ok(())
    }

    /// Account for batches that were queued but never dispatched
    fn drain(&self, batches: &mut mpsc::Receiver<Batch>) {
        batches.close();
        let mut dropped = 0;
        while let Ok(batch) = batches.try_recv() {
            dropped += batch.len() as u64;
        }
        if dropped > 0 {
            log::debug!("Dropping {} queued group(s) at shutdown", dropped);
            self.stats.record_abandoned(dropped);
        }
    }

    /// Admit every group of `batch` to a slot and spawn its task
    ///
    /// Returns `false` if the pipeline was cancelled part way through.
    async fn dispatch(self: Arc<Self>, batch: Batch) -> PipelineResult<bool> {
        let window_id = batch.window_id();
        let sequences = batch.sequences();
        let mut groups = batch.into_groups().into_iter();

        while let Some(group) = groups.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // This group and everything after it never started
                    self.stats.record_abandoned(1 + groups.len() as u64);
                    return Ok(false);
                }
                acquired = self.slots.clone().acquire_owned() => acquired.map_err(|_| {
                    PipelineError::fatal("concurrency limiter closed while dispatching")
                })?,
            };

            log::trace!(
                "Dispatching {} from window {} after {}ms in queue",
                group.label(),
                window_id,
                group.queued_for().as_millis()
            );
            tokio::spawn(self.clone().process(group, permit));
        }

        self.notifier
            .publish(Event::Batch(BatchEvent::new(
                BatchEventType::Dispatched,
                window_id,
                sequences,
            )))
            .await;
        Ok(true)
    }

    async fn process(self: Arc<Self>, group: Arc<MessageGroup>, permit: OwnedSemaphorePermit) {
        let label = group.label();
        let mut task = ProcessingTask::new(group);
        let mut permit = Some(permit);

        let outcome = loop {
            let slot = match permit.take() {
                Some(slot) => slot,
                None => match self.reacquire().await {
                    Some(slot) => slot,
                    None => break task.abandon(),
                },
            };

            let attempt = task.begin_attempt();
            self.stats.attempt_started();
            let result = self.invoke(task.group()).await;
            self.stats.attempt_finished();
            drop(slot);

            let error = match result {
                Attempt::Completed => {
                    log::debug!(
                        "{} processed on attempt {} ({}ms)",
                        label,
                        attempt,
                        task.elapsed().as_millis()
                    );
                    self.publish_task(TaskEvent::new(
                        TaskEventType::Succeeded,
                        task.group().sequence,
                        task.group().request_id.clone(),
                        attempt,
                    ))
                    .await;
                    break task.succeed();
                }
                Attempt::Cancelled => break task.abandon(),
                Attempt::Failed(error) => error,
            };

            match &error {
                TaskError::Timeout { .. } => self.stats.record_timeout(),
                _ => self.stats.record_handler_error(),
            }

            if !self.policy.should_retry(attempt) || !error.is_retryable() {
                task.record_failure(error);
                break self.exhaust(task).await;
            }

            log::warn!(
                "{} attempt {}/{} failed: {}; retrying in {}ms",
                label,
                attempt,
                self.policy.max_attempts,
                error,
                self.policy.delay.as_millis()
            );
            self.publish_task(TaskEvent::with_message(
                TaskEventType::AttemptFailed,
                task.group().sequence,
                task.group().request_id.clone(),
                attempt,
                error.to_string(),
            ))
            .await;
            task.record_failure(error);

            if !self.policy.backoff(&self.cancel).await {
                break task.abandon();
            }
        };

        if let TaskOutcome::Abandoned { attempts } = &outcome {
            log::debug!("{} abandoned after {} attempt(s)", label, attempts);
        }
        self.stats.record_outcome(&outcome);
    }

    async fn exhaust(&self, task: ProcessingTask) -> TaskOutcome {
        let sequence = task.group().sequence;
        let request_id = task.group().request_id.clone();
        let label = task.group().label();
        let outcome = task.exhaust();

        if let TaskOutcome::Exhausted {
            attempts,
            last_error,
        } = &outcome
        {
            let error = TaskError::RetryExhausted {
                attempts: *attempts,
                last_error: Box::new(last_error.clone()),
            };
            log::error!("{} discarded: {}", label, error);
            self.publish_task(TaskEvent::with_message(
                TaskEventType::RetryExhausted,
                sequence,
                request_id,
                *attempts,
                error.to_string(),
            ))
            .await;
        }
        outcome
    }

    async fn reacquire(&self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            acquired = self.slots.clone().acquire_owned() => acquired.ok(),
        }
    }

    /// Run the handler once under the attempt deadline
    async fn invoke(&self, group: &Arc<MessageGroup>) -> Attempt {
        let token = self.cancel.child_token();
        let call =
            AssertUnwindSafe(self.handler.handle(group.clone(), token.clone())).catch_unwind();
        let deadline = self.policy.attempt_timeout;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Attempt::Cancelled,
            result = attempt_with_deadline(deadline, async move {
                match call.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => Err(TaskError::handler(error.to_string())),
                    Err(panic) => Err(TaskError::handler(format!(
                        "handler panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                }
            }) => result,
        };

        match result {
            Ok(()) => Attempt::Completed,
            Err(AttemptFailure::Failed(error)) => Attempt::Failed(error),
            Err(AttemptFailure::TimedOut(elapsed)) => {
                token.cancel();
                Attempt::Failed(TaskError::timeout(elapsed))
            }
        }
    }

    /// Task events are not published once the pipeline has been torn down
    async fn publish_task(&self, event: TaskEvent) {
        if !self.cancel.is_cancelled() {
            self.notifier.publish(Event::Task(event)).await;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
