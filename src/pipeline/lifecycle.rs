//! Lifecycle Manager
//!
//! [`Pipeline`] owns every piece of the running system: the ingestion
//! channel, the batcher and executor stages, the concurrency limiter and the
//! cancellation root. Nothing is global; two pipelines in one process are
//! fully independent.
//!
//! ```text
//! Unmounted --mount--> Running --destroy--> Destroyed
//!     |                   |
//!     |                   +--stage failure--> Halted { reason }
//!     +--destroy--> Destroyed
//! ```
//!
//! `Destroyed` and `Halted` are both terminal and a pipeline is never
//! mounted twice. `Halted` is only reached through a fault outside task
//! isolation, so callers can tell a deliberate stop from a crash.

use crate::notifications::api::{
    Event, EventFilter, EventReceiver, LifecycleEvent, LifecycleEventType, Notifier,
};
use crate::pipeline::batcher::Batcher;
use crate::pipeline::channel::{ingestion_channel, Submitter};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::Executor;
use crate::pipeline::handler::MessageHandler;
use crate::pipeline::message::MessageGroup;
use crate::pipeline::stats::{PipelineStats, StatsCollector};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Closed batches waiting for the executor
const BATCH_QUEUE_DEPTH: usize = 16;

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Unmounted,
    Running,
    /// Stopped by an explicit `destroy()`
    Destroyed,
    /// Stopped by a fault in the pipeline machinery
    Halted { reason: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Destroyed | PipelineState::Halted { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Unmounted => write!(f, "unmounted"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Destroyed => write!(f, "destroyed"),
            PipelineState::Halted { reason } => write!(f, "halted ({})", reason),
        }
    }
}

type StageResult = (&'static str, PipelineResult<()>);

pub struct Pipeline {
    config: PipelineConfig,
    handler: Arc<dyn MessageHandler>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<PipelineState>>,
    notifier: Notifier,
    stats: Arc<StatsCollector>,
    slots: Arc<Semaphore>,
    submitter: OnceLock<Submitter>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    /// Create an unmounted pipeline
    ///
    /// The configuration is only validated by [`Pipeline::mount`].
    pub fn new(config: PipelineConfig, handler: impl MessageHandler + 'static) -> Self {
        let (state, _) = watch::channel(PipelineState::Unmounted);
        let permits = config.max_concurrency.min(Semaphore::MAX_PERMITS);
        Self {
            config,
            handler: Arc::new(handler),
            cancel: CancellationToken::new(),
            state: Arc::new(state),
            notifier: Notifier::new(),
            stats: Arc::new(StatsCollector::new()),
            slots: Arc::new(Semaphore::new(permits)),
            submitter: OnceLock::new(),
            supervisor: Mutex::new(None),
        }
    }

    /// Create and mount a pipeline in one step
    pub async fn start(
        config: PipelineConfig,
        handler: impl MessageHandler + 'static,
    ) -> PipelineResult<Self> {
        let pipeline = Self::new(config, handler);
        pipeline.mount().await?;
        Ok(pipeline)
    }

    /// Validate the configuration and start consuming
    pub async fn mount(&self) -> PipelineResult<()> {
        self.config.validate()?;

        let mut refused = None;
        self.state.send_if_modified(|state| match state {
            PipelineState::Unmounted => {
                *state = PipelineState::Running;
                true
            }
            PipelineState::Running => {
                refused = Some(PipelineError::AlreadyMounted);
                false
            }
            PipelineState::Destroyed | PipelineState::Halted { .. } => {
                refused = Some(PipelineError::NotRestartable);
                false
            }
        });
        if let Some(error) = refused {
            return Err(error);
        }

        let (submitter, groups) = ingestion_channel(
            self.config.channel_capacity,
            self.cancel.clone(),
            self.stats.clone(),
        );
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_QUEUE_DEPTH);

        let batcher = Batcher::new(
            &self.config,
            self.cancel.clone(),
            self.notifier.clone(),
            self.stats.clone(),
        );
        let executor = Arc::new(Executor::new(
            self.handler.clone(),
            self.config.retry_policy(),
            self.slots.clone(),
            self.cancel.clone(),
            self.notifier.clone(),
            self.stats.clone(),
        ));

        let mut stages: JoinSet<StageResult> = JoinSet::new();
        stages.spawn(async move { ("batcher", batcher.run(groups, batch_tx).await) });
        stages.spawn(async move { ("executor", executor.run(batch_rx).await) });

        // Only the mount that won the state transition gets here
        let _ = self.submitter.set(submitter);

        let supervisor = tokio::spawn(supervise(
            stages,
            self.cancel.clone(),
            self.state.clone(),
            self.notifier.clone(),
            self.config.name.clone(),
        ));
        *self.supervisor.lock().await = Some(supervisor);

        log::info!(
            "Pipeline '{}' mounted (concurrency {}, window {}ms, deadline {}ms, {} attempts)",
            self.config.name,
            self.config.max_concurrency,
            self.config.batch_timeout_ms,
            self.config.timeout_ms,
            self.config.max_retry_attempts
        );
        self.notifier
            .publish(Event::Lifecycle(LifecycleEvent::new(
                LifecycleEventType::Mounted,
                self.config.name.clone(),
            )))
            .await;
        Ok(())
    }

    /// Stop the pipeline
    ///
    /// Submission closes immediately. Groups still buffered are dropped and
    /// tasks in flight are abandoned without reporting an outcome. Calling
    /// this again, or on a halted pipeline, has no further effect.
    pub async fn destroy(&self) {
        // State first, so the supervisor does not read the cancellation as a fault
        let destroyed = self.state.send_if_modified(|state| match state {
            PipelineState::Unmounted | PipelineState::Running => {
                *state = PipelineState::Destroyed;
                true
            }
            _ => false,
        });
        self.cancel.cancel();

        if let Some(supervisor) = self.supervisor.lock().await.take() {
            if let Err(e) = supervisor.await {
                log::debug!("Supervisor of '{}' ended abnormally: {}", self.config.name, e);
            }
        }

        if destroyed {
            log::info!("Pipeline '{}' destroyed", self.config.name);
            self.notifier
                .publish(Event::Lifecycle(LifecycleEvent::new(
                    LifecycleEventType::Destroyed,
                    self.config.name.clone(),
                )))
                .await;
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Submit a group without waiting; see [`Submitter::submit`]
    pub fn submit(&self, group: MessageGroup) -> PipelineResult<u64> {
        self.submitter()?.submit(group)
    }

    /// Submit a group, waiting for channel capacity; see [`Submitter::submit_wait`]
    pub async fn submit_wait(&self, group: MessageGroup) -> PipelineResult<u64> {
        self.submitter()?.submit_wait(group).await
    }

    /// Producer handle that can be moved to other tasks
    pub fn submitter(&self) -> PipelineResult<Submitter> {
        match self.submitter.get() {
            Some(submitter) => Ok(submitter.clone()),
            None if self.state().is_terminal() => Err(PipelineError::Closed),
            None => Err(PipelineError::NotMounted),
        }
    }

    /// Resolves with the terminal state once the pipeline stops
    pub async fn wait_terminated(&self) -> PipelineState {
        let mut state = self.state.subscribe();
        let terminal = match state.wait_for(PipelineState::is_terminal).await {
            Ok(terminal) => terminal.clone(),
            Err(_) => self.state(),
        };
        terminal
    }

    /// Wait until every accepted group has reached a terminal outcome
    ///
    /// Returns `false` if `timeout` elapsed first or the pipeline stopped
    /// with work still pending.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut state = self.state.subscribe();
        let idle = async {
            loop {
                let settled = self.stats.settled().notified();
                tokio::pin!(settled);
                settled.as_mut().enable();

                if self.stats.snapshot().pending() == 0 {
                    return true;
                }
                if state.borrow_and_update().is_terminal() {
                    return false;
                }

                tokio::select! {
                    _ = settled => {}
                    _ = state.changed() => {}
                }
            }
        };
        tokio::time::timeout(timeout, idle).await.unwrap_or(false)
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Receive pipeline events matching `filter`
    pub async fn subscribe(&self, subscriber_id: impl Into<String>, filter: EventFilter) -> EventReceiver {
        self.notifier
            .subscribe(subscriber_id.into(), filter, self.config.name.clone())
            .await
    }

    /// Stop delivering events to `subscriber_id`; its receiver then ends
    pub async fn unsubscribe(&self, subscriber_id: &str) -> bool {
        self.notifier.unsubscribe(subscriber_id).await
    }

    /// Close the concurrency limiter as if the dispatch machinery broke
    #[cfg(test)]
    pub(crate) fn close_slots(&self) {
        self.slots.close();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Watch the stages and halt the pipeline if one of them fails
async fn supervise(
    mut stages: JoinSet<StageResult>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<PipelineState>>,
    notifier: Notifier,
    name: String,
) {
    while let Some(joined) = stages.join_next().await {
        let reason = match joined {
            Ok((stage, Ok(()))) => {
                if cancel.is_cancelled() {
                    log::debug!("Pipeline '{}': {} stage finished", name, stage);
                    continue;
                }
                format!("{} stage exited unexpectedly", stage)
            }
            Ok((stage, Err(e))) => format!("{} stage failed: {}", stage, e),
            Err(e) => format!("pipeline stage panicked: {}", e),
        };

        let halted = state.send_if_modified(|current| {
            if *current == PipelineState::Running {
                *current = PipelineState::Halted {
                    reason: reason.clone(),
                };
                true
            } else {
                false
            }
        });
        cancel.cancel();

        if halted {
            log::error!("Pipeline '{}' halted: {}", name, reason);
            notifier
                .publish(Event::Lifecycle(LifecycleEvent::with_message(
                    LifecycleEventType::Halted,
                    name.clone(),
                    reason,
                )))
                .await;
        } else {
            log::debug!("Pipeline '{}' ignoring stage failure after stop: {}", name, reason);
        }
    }
}
