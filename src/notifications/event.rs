//! Event types for the notification system

use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEventType {
    Mounted,
    Destroyed,
    Halted,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BatchEventType {
    /// A window closed with at least one group in it
    Flushed,
    /// Every group of the batch has been admitted to a concurrency slot
    Dispatched,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskEventType {
    Succeeded,
    AttemptFailed,
    RetryExhausted,
}

#[derive(Clone, Debug)]
pub struct LifecycleEvent {
    pub event_type: LifecycleEventType,
    pub timestamp: SystemTime,
    pub pipeline: String,
    pub message: Option<String>,
}

impl LifecycleEvent {
    pub fn new(event_type: LifecycleEventType, pipeline: String) -> Self {
        Self {
            event_type,
            timestamp: SystemTime::now(),
            pipeline,
            message: None,
        }
    }

    pub fn with_message(event_type: LifecycleEventType, pipeline: String, message: String) -> Self {
        Self {
            event_type,
            timestamp: SystemTime::now(),
            pipeline,
            message: Some(message),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BatchEvent {
    pub event_type: BatchEventType,
    pub timestamp: SystemTime,
    pub window_id: u64,
    /// Sequences of the groups in the batch, in arrival order
    pub sequences: Vec<u64>,
}

impl BatchEvent {
    pub fn new(event_type: BatchEventType, window_id: u64, sequences: Vec<u64>) -> Self {
        Self {
            event_type,
            timestamp: SystemTime::now(),
            window_id,
            sequences,
        }
    }

    pub fn size(&self) -> usize {
        self.sequences.len()
    }
}

#[derive(Clone, Debug)]
pub struct TaskEvent {
    pub event_type: TaskEventType,
    pub timestamp: SystemTime,
    pub sequence: u64,
    pub request_id: Option<String>,
    pub attempt: u32,
    pub message: Option<String>,
}

impl TaskEvent {
    pub fn new(
        event_type: TaskEventType,
        sequence: u64,
        request_id: Option<String>,
        attempt: u32,
    ) -> Self {
        Self {
            event_type,
            timestamp: SystemTime::now(),
            sequence,
            request_id,
            attempt,
            message: None,
        }
    }

    pub fn with_message(
        event_type: TaskEventType,
        sequence: u64,
        request_id: Option<String>,
        attempt: u32,
        message: String,
    ) -> Self {
        Self {
            message: Some(message),
            ..Self::new(event_type, sequence, request_id, attempt)
        }
    }
}

/// Everything the pipeline publishes
#[derive(Clone, Debug)]
pub enum Event {
    Lifecycle(LifecycleEvent),
    Batch(BatchEvent),
    Task(TaskEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Lifecycle(_) => "Lifecycle",
            Event::Batch(_) => "Batch",
            Event::Task(_) => "Task",
        }
    }
}

/// Selects which events a subscriber receives
#[derive(Clone, Debug, PartialEq)]
pub enum EventFilter {
    All,
    LifecycleOnly,
    BatchOnly,
    TaskOnly,
    /// Terminal task results only: successes and exhausted retries
    TaskOutcomes,
}

impl EventFilter {
    pub fn accepts(&self, event: &Event) -> bool {
        match (self, event) {
            (EventFilter::All, _) => true,
            (EventFilter::LifecycleOnly, Event::Lifecycle(_)) => true,
            (EventFilter::BatchOnly, Event::Batch(_)) => true,
            (EventFilter::TaskOnly, Event::Task(_)) => true,
            (EventFilter::TaskOutcomes, Event::Task(task)) => matches!(
                task.event_type,
                TaskEventType::Succeeded | TaskEventType::RetryExhausted
            ),
            _ => false,
        }
    }
}
