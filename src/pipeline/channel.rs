//! Ingestion Channel
//!
//! Bounded hand-off between transport producers and the batcher. Producers
//! hold cheap [`Submitter`] clones; the batcher owns the receiving end.
//!
//! Backpressure is explicit: [`Submitter::submit`] never waits and rejects
//! with [`PipelineError::ChannelFull`] when the buffer is at capacity, while
//! [`Submitter::submit_wait`] suspends the producer until room frees up.
//! Both fail with [`PipelineError::Closed`] once the pipeline has been
//! destroyed or halted.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::MessageGroup;
use crate::pipeline::stats::StatsCollector;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

pub(crate) type IngestionReceiver = mpsc::Receiver<Arc<MessageGroup>>;

/// Producer handle for the ingestion channel
#[derive(Clone)]
pub struct Submitter {
    sender: mpsc::Sender<Arc<MessageGroup>>,
    capacity: usize,
    next_sequence: Arc<AtomicU64>,
    closed: CancellationToken,
    stats: Arc<StatsCollector>,
}

pub(crate) fn ingestion_channel(
    capacity: usize,
    closed: CancellationToken,
    stats: Arc<StatsCollector>,
) -> (Submitter, IngestionReceiver) {
    let (sender, receiver) = mpsc::channel(capacity);
    let submitter = Submitter {
        sender,
        capacity,
        // Start from 1, 0 marks a group that was never submitted
        next_sequence: Arc::new(AtomicU64::new(1)),
        closed,
        stats,
    };
    (submitter, receiver)
}

impl Submitter {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }

    /// Assign the next sequence number; only called once a slot is reserved
    fn stamp(&self, mut group: MessageGroup) -> Arc<MessageGroup> {
        group.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        Arc::new(group)
    }

    fn accept(&self, permit: mpsc::Permit<'_, Arc<MessageGroup>>, group: MessageGroup) -> u64 {
        let group = self.stamp(group);
        let sequence = group.sequence;
        permit.send(group);
        self.stats.record_submitted();
        log::trace!("Accepted group #{}", sequence);
        sequence
    }

    /// Hand a group to the pipeline without waiting
    ///
    /// Returns the sequence number assigned to the group. Processing outcome
    /// is never reported back through this call. Rejected groups do not use
    /// up a sequence number.
    pub fn submit(&self, group: MessageGroup) -> PipelineResult<u64> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }

        match self.sender.try_reserve() {
            Ok(permit) => Ok(self.accept(permit, group)),
            Err(TrySendError::Full(())) => {
                self.stats.record_rejected();
                log::warn!(
                    "Ingestion channel full (capacity {}), rejected {}",
                    self.capacity,
                    group.request_id.as_deref().unwrap_or("group")
                );
                Err(PipelineError::ChannelFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(())) => Err(PipelineError::Closed),
        }
    }

    /// Hand a group to the pipeline, waiting for buffer space if needed
    pub async fn submit_wait(&self, group: MessageGroup) -> PipelineResult<u64> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(PipelineError::Closed),
            reserved = self.sender.reserve() => match reserved {
                Ok(permit) => Ok(self.accept(permit, group)),
                Err(_) => Err(PipelineError::Closed),
            },
        }
    }
}
