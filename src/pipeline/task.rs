//! Per-group processing state
//!
//! A [`ProcessingTask`] is the plain record the executor keeps for one group
//! while it works through its attempts.

use crate::pipeline::error::TaskError;
use crate::pipeline::message::MessageGroup;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Terminal result of a processing task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32, last_error: TaskError },
    /// The pipeline stopped before the task settled; never reported as an event
    Abandoned { attempts: u32 },
}

impl TaskOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            TaskOutcome::Succeeded { attempts }
            | TaskOutcome::Exhausted { attempts, .. }
            | TaskOutcome::Abandoned { attempts } => *attempts,
        }
    }
}

#[derive(Debug)]
pub struct ProcessingTask {
    group: Arc<MessageGroup>,
    attempts: u32,
    started: Instant,
    last_error: Option<TaskError>,
}

impl ProcessingTask {
    pub fn new(group: Arc<MessageGroup>) -> Self {
        Self {
            group,
            attempts: 0,
            started: Instant::now(),
            last_error: None,
        }
    }

    pub fn group(&self) -> &Arc<MessageGroup> {
        &self.group
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn last_error(&self) -> Option<&TaskError> {
        self.last_error.as_ref()
    }

    /// Count a new attempt and return its number, starting from one
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn record_failure(&mut self, error: TaskError) {
        self.last_error = Some(error);
    }

    pub fn succeed(self) -> TaskOutcome {
        TaskOutcome::Succeeded {
            attempts: self.attempts,
        }
    }

    pub fn exhaust(self) -> TaskOutcome {
        let last_error = self
            .last_error
            .unwrap_or_else(|| TaskError::handler("no attempt recorded"));
        TaskOutcome::Exhausted {
            attempts: self.attempts,
            last_error,
        }
    }

    pub fn abandon(self) -> TaskOutcome {
        TaskOutcome::Abandoned {
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::message::UpsertKind;

    fn task() -> ProcessingTask {
        ProcessingTask::new(Arc::new(MessageGroup::new(vec![], UpsertKind::Notify)))
    }

    #[test]
    fn test_attempts_are_numbered_from_one() {
        let mut task = task();
        assert_eq!(task.attempts(), 0);
        assert_eq!(task.begin_attempt(), 1);
        assert_eq!(task.begin_attempt(), 2);
        assert_eq!(task.succeed(), TaskOutcome::Succeeded { attempts: 2 });
    }

    #[test]
    fn test_exhaust_keeps_last_error() {
        let mut task = task();
        task.begin_attempt();
        task.record_failure(TaskError::handler("first"));
        task.begin_attempt();
        task.record_failure(TaskError::timeout(Duration::from_millis(10)));

        assert_eq!(
            task.exhaust(),
            TaskOutcome::Exhausted {
                attempts: 2,
                last_error: TaskError::Timeout { timeout_ms: 10 },
            }
        );
    }

    #[test]
    fn test_abandon_reports_attempts_made() {
        let mut task = task();
        task.begin_attempt();
        let outcome = task.abandon();
        assert_eq!(outcome.attempts(), 1);
        assert!(matches!(outcome, TaskOutcome::Abandoned { .. }));
    }
}
