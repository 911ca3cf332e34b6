//! Common test utilities and helpers
//!
//! Fixtures shared by the integration suites: a recording handler and
//! configurations short enough to run on a paused clock.

#![allow(dead_code)]

use msgflow::pipeline::api::{HandlerError, MessageGroup, PipelineConfig, UpsertKind};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        name: "integration".to_string(),
        max_concurrency: 4,
        timeout_ms: 500,
        batch_timeout_ms: 50,
        max_retry_attempts: 3,
        retry_delay_ms: 100,
        channel_capacity: 128,
        max_batch_size: None,
    }
}

pub fn group(request_id: &str) -> MessageGroup {
    MessageGroup::new(
        vec![serde_json::json!({ "id": request_id, "body": "hello" })],
        UpsertKind::Notify,
    )
    .with_request_id(request_id)
}

/// Request ids seen by the handler, in invocation order
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Handler failing every attempt for the ids in `failing`
    pub fn handler(
        &self,
        failing: &[&str],
    ) -> impl Fn(
        Arc<MessageGroup>,
        CancellationToken,
    ) -> std::future::Ready<Result<(), HandlerError>>
           + Send
           + Sync
           + 'static {
        let seen = self.seen.clone();
        let failing: HashSet<String> = failing.iter().map(|id| id.to_string()).collect();
        move |group: Arc<MessageGroup>, _cancel: CancellationToken| {
            let id = group.request_id.clone().unwrap_or_default();
            seen.lock().unwrap().push(id.clone());
            let result: Result<(), HandlerError> = if failing.contains(&id) {
                Err(format!("{} rejected", id).into())
            } else {
                Ok(())
            };
            std::future::ready(result)
        }
    }
}
