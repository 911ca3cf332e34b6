//! Batcher
//!
//! Drains the ingestion channel and groups arrivals into time windows.
//!
//! A window opens when a group lands in an empty buffer and stays open as
//! long as groups keep arriving less than `batch_timeout_ms` apart. It
//! closes once the channel has been quiet for a full `batch_timeout_ms`, or
//! earlier when `max_batch_size` is reached, which bounds a batch under
//! sustained load. At close the buffer is moved out in one step and emitted
//! as a [`Batch`], so a group can never end up in two batches. No timer
//! runs while the buffer is empty, which means idle periods emit nothing.
//!
//! Boundary rule: when the window deadline and a new arrival are ready at
//! the same moment, the deadline is handled first and the arrival opens the
//! next window. A gap of exactly `batch_timeout_ms` therefore splits.

use crate::notifications::api::{BatchEvent, BatchEventType, Event, Notifier};
use crate::pipeline::channel::IngestionReceiver;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::{Batch, MessageGroup};
use crate::pipeline::stats::StatsCollector;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

pub(crate) struct Batcher {
    window: Duration,
    max_batch_size: Option<usize>,
    next_window_id: u64,
    buffer: Vec<Arc<MessageGroup>>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    notifier: Notifier,
    stats: Arc<StatsCollector>,
}

async fn window_closes(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Batcher {
    pub fn new(
        config: &PipelineConfig,
        cancel: CancellationToken,
        notifier: Notifier,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            window: config.batch_window(),
            max_batch_size: config.max_batch_size,
            next_window_id: 1,
            buffer: Vec::new(),
            deadline: None,
            cancel,
            notifier,
            stats,
        }
    }

    /// Consume groups until the pipeline is cancelled
    ///
    /// Groups still buffered at cancellation are dropped, never dispatched.
    pub async fn run(
        mut self,
        mut groups: IngestionReceiver,
        batches: mpsc::Sender<Batch>,
    ) -> PipelineResult<()> {
        log::debug!("Batcher started ({}ms windows)", self.window.as_millis());

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.discard_buffer();
                    break;
                }
                _ = window_closes(self.deadline) => {
                    self.flush(&batches).await?;
                }
                received = groups.recv() => match received {
                    Some(group) => {
                        // Every arrival pushes the close back by a full window
                        self.deadline = Some(Instant::now() + self.window);
                        self.buffer.push(group);
                        if self.max_batch_size.is_some_and(|max| self.buffer.len() >= max) {
                            self.flush(&batches).await?;
                        }
                    }
                    None => {
                        // Every submitter is gone; nothing more can arrive
                        self.flush(&batches).await?;
                        break;
                    }
                },
            }
        }

        log::debug!("Batcher stopped");
        Ok(())
    }

    async fn flush(&mut self, batches: &mpsc::Sender<Batch>) -> PipelineResult<()> {
        self.deadline = None;
        let groups = mem::take(&mut self.buffer);
        let Some(batch) = Batch::new(self.next_window_id, groups) else {
            return Ok(());
        };
        self.next_window_id += 1;

        let window_id = batch.window_id();
        let sequences = batch.sequences();
        log::debug!(
            "Window {} closed with {} group(s)",
            window_id,
            sequences.len()
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.stats.record_abandoned(sequences.len() as u64);
                return Ok(());
            }
            sent = batches.send(batch) => {
                if sent.is_err() {
                    return Err(PipelineError::fatal(format!(
                        "executor stopped accepting batches (window {})",
                        window_id
                    )));
                }
            }
        }

        self.stats.record_batch();
        self.notifier
            .publish(Event::Batch(BatchEvent::new(
                BatchEventType::Flushed,
                window_id,
                sequences,
            )))
            .await;
        Ok(())
    }

    fn discard_buffer(&mut self) {
        if !self.buffer.is_empty() {
            log::debug!(
                "Dropping {} buffered group(s) at shutdown",
                self.buffer.len()
            );
            self.stats.record_abandoned(self.buffer.len() as u64);
            self.buffer.clear();
        }
    }
}
