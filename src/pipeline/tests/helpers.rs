//! Instrumented handler and shared fixtures

use crate::notifications::api::{Event, EventReceiver, TaskEvent, TaskEventType};
use crate::pipeline::api::{HandlerError, MessageGroup, MessageHandler, PipelineConfig, UpsertKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

/// What the handler does with a group
#[derive(Debug, Clone, Copy)]
pub(super) enum Behavior {
    Succeed,
    Fail,
    /// Fail the first `n` attempts, then succeed
    FailTimes(u32),
    /// Wait for the cancellation token
    Hang,
    Panic,
}

#[derive(Debug, Clone)]
pub(super) struct Call {
    pub sequence: u64,
    pub request_id: Option<String>,
    pub attempt: u32,
    pub at: Instant,
}

#[derive(Default)]
pub(super) struct CallLog {
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl CallLog {
    fn begin(&self, group: &MessageGroup) -> u32 {
        let mut calls = self.calls.lock().unwrap();
        let attempt = calls
            .iter()
            .filter(|call| call.sequence == group.sequence)
            .count() as u32
            + 1;
        calls.push(Call {
            sequence: group.sequence,
            request_id: group.request_id.clone(),
            attempt,
            at: Instant::now(),
        });

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        attempt
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, request_id: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.request_id.as_deref() == Some(request_id))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

/// Decrements the running count even when the invocation is dropped at its deadline
struct Running(Arc<CallLog>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(super) struct ScriptedHandler {
    default: Behavior,
    overrides: HashMap<String, Behavior>,
    work: Duration,
    log: Arc<CallLog>,
}

impl ScriptedHandler {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            work: Duration::ZERO,
            log: Arc::new(CallLog::default()),
        }
    }

    /// Use `behavior` for groups carrying `request_id`
    pub fn with(mut self, request_id: &str, behavior: Behavior) -> Self {
        self.overrides.insert(request_id.to_string(), behavior);
        self
    }

    /// Simulated processing time of every invocation
    pub fn working_for(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    pub fn log(&self) -> Arc<CallLog> {
        self.log.clone()
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(
        &self,
        group: Arc<MessageGroup>,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        let attempt = self.log.begin(&group);
        let _running = Running(self.log.clone());

        let behavior = group
            .request_id
            .as_ref()
            .and_then(|id| self.overrides.get(id))
            .copied()
            .unwrap_or(self.default);

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err("scripted failure".into()),
            Behavior::FailTimes(n) if attempt <= n => {
                Err(format!("scripted failure {}", attempt).into())
            }
            Behavior::FailTimes(_) => Ok(()),
            Behavior::Hang => {
                cancel.cancelled().await;
                Err("cancelled".into())
            }
            Behavior::Panic => panic!("scripted panic"),
        }
    }
}

/// Short windows and deadlines for paused-clock tests
pub(super) fn test_config() -> PipelineConfig {
    PipelineConfig {
        name: "test".to_string(),
        max_concurrency: 5,
        timeout_ms: 1_000,
        batch_timeout_ms: 100,
        max_retry_attempts: 3,
        retry_delay_ms: 200,
        channel_capacity: 64,
        max_batch_size: None,
    }
}

pub(super) fn group(request_id: &str) -> MessageGroup {
    MessageGroup::new(
        vec![serde_json::json!({ "id": request_id })],
        UpsertKind::Notify,
    )
    .with_request_id(request_id)
}

/// Next event, failing the test if none arrives within a minute of virtual time
pub(super) async fn next_event(events: &mut EventReceiver) -> Event {
    match timeout(Duration::from_secs(60), events.recv()).await {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event channel closed"),
        Err(_) => panic!("timed out waiting for event"),
    }
}

/// Next task event of the given type, skipping anything else
pub(super) async fn next_task_event(events: &mut EventReceiver, wanted: TaskEventType) -> TaskEvent {
    loop {
        if let Event::Task(task) = next_event(events).await {
            if task.event_type == wanted {
                return task;
            }
        }
    }
}
