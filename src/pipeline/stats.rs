//! Pipeline counters
//!
//! Counters are plain atomics updated by the channel, the batcher and the
//! executor tasks. [`PipelineStats`] is a point-in-time copy for callers.

use crate::pipeline::task::TaskOutcome;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Snapshot of pipeline activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Groups accepted by the ingestion channel
    pub submitted: u64,
    /// Groups refused because the channel was full
    pub rejected: u64,
    /// Non-empty batches emitted by the batcher
    pub batches: u64,
    /// Handler invocations started
    pub attempts: u64,
    /// Attempts that ended at the deadline
    pub timed_out: u64,
    /// Attempts where the handler failed or panicked
    pub handler_errors: u64,
    /// Groups processed successfully
    pub succeeded: u64,
    /// Groups discarded after their last attempt failed
    pub exhausted: u64,
    /// Groups given up on because the pipeline stopped
    pub abandoned: u64,
    /// Handler invocations running right now
    pub in_flight: usize,
    /// Highest number of simultaneous handler invocations observed
    pub peak_in_flight: usize,
}

impl PipelineStats {
    /// Groups accepted but not yet settled
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.succeeded + self.exhausted + self.abandoned)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    submitted: AtomicU64,
    rejected: AtomicU64,
    batches: AtomicU64,
    attempts: AtomicU64,
    timed_out: AtomicU64,
    handler_errors: AtomicU64,
    succeeded: AtomicU64,
    exhausted: AtomicU64,
    abandoned: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    settled: Notify,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempt_started(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let running = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::AcqRel);
    }

    pub fn attempt_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count groups dropped without a task, e.g. still buffered at teardown
    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::AcqRel);
        self.settled.notify_waiters();
    }

    pub fn record_outcome(&self, outcome: &TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Succeeded { .. } => &self.succeeded,
            TaskOutcome::Exhausted { .. } => &self.exhausted,
            TaskOutcome::Abandoned { .. } => &self.abandoned,
        };
        counter.fetch_add(1, Ordering::AcqRel);
        self.settled.notify_waiters();
    }

    /// Notification fired whenever a group settles
    pub fn settled(&self) -> &Notify {
        &self.settled
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.submitted.load(Ordering::Acquire),
            rejected: self.rejected.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Acquire),
            exhausted: self.exhausted.load(Ordering::Acquire),
            abandoned: self.abandoned.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::TaskError;

    #[test]
    fn test_pending_counts_unsettled_groups() {
        let stats = StatsCollector::new();
        for _ in 0..4 {
            stats.record_submitted();
        }
        stats.record_outcome(&TaskOutcome::Succeeded { attempts: 1 });
        stats.record_outcome(&TaskOutcome::Exhausted {
            attempts: 3,
            last_error: TaskError::handler("boom"),
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.submitted, 4);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.exhausted, 1);
        assert_eq!(snapshot.pending(), 2);

        stats.record_abandoned(2);
        assert_eq!(stats.snapshot().pending(), 0);
    }

    #[test]
    fn test_peak_in_flight_tracks_maximum() {
        let stats = StatsCollector::new();
        stats.attempt_started();
        stats.attempt_started();
        stats.attempt_started();
        stats.attempt_finished();
        stats.attempt_finished();
        stats.attempt_started();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.attempts, 4);
        assert_eq!(snapshot.in_flight, 2);
        assert_eq!(snapshot.peak_in_flight, 3);
    }
}
