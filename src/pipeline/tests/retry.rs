//! Tests for bounded retry with a fixed delay

use super::helpers::{group, next_task_event, test_config, Behavior, ScriptedHandler};
use crate::notifications::api::{EventFilter, TaskEventType};
use crate::pipeline::api::{Pipeline, PipelineConfig};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_always_failing_group_gets_exactly_max_attempts() {
    let handler = ScriptedHandler::new(Behavior::Fail);
    let log = handler.log();
    let pipeline = Pipeline::new(test_config(), handler);
    let mut events = pipeline.subscribe("tasks", EventFilter::TaskOnly).await;
    pipeline.mount().await.unwrap();

    pipeline.submit(group("doomed")).unwrap();

    let exhausted = next_task_event(&mut events, TaskEventType::RetryExhausted).await;
    assert_eq!(exhausted.attempt, 3);
    assert_eq!(exhausted.request_id.as_deref(), Some("doomed"));
    let message = exhausted.message.unwrap();
    assert!(message.contains("scripted failure"), "got: {}", message);

    let calls = log.calls();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1].at.duration_since(pair[0].at) >= Duration::from_millis(200));
    }

    // No fourth attempt ever happens
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(log.count(), 3);

    let stats = pipeline.stats();
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.handler_errors, 3);
    assert_eq!(stats.exhausted, 1);
    assert_eq!(stats.succeeded, 0);

    pipeline.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_recovers_on_later_attempt() {
    let handler = ScriptedHandler::new(Behavior::FailTimes(1));
    let log = handler.log();
    let pipeline = Pipeline::new(test_config(), handler);
    let mut events = pipeline.subscribe("tasks", EventFilter::TaskOnly).await;
    pipeline.mount().await.unwrap();

    pipeline.submit(group("flaky")).unwrap();

    let failed = next_task_event(&mut events, TaskEventType::AttemptFailed).await;
    assert_eq!(failed.attempt, 1);
    let succeeded = next_task_event(&mut events, TaskEventType::Succeeded).await;
    assert_eq!(succeeded.attempt, 2);

    assert_eq!(log.count(), 2);
    let stats = pipeline.stats();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.exhausted, 0);

    pipeline.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_policy_never_retries() {
    let handler = ScriptedHandler::new(Behavior::Fail);
    let log = handler.log();
    let config = PipelineConfig {
        max_retry_attempts: 1,
        ..test_config()
    };
    let pipeline = Pipeline::start(config, handler).await.unwrap();

    pipeline.submit(group("once")).unwrap();
    assert!(pipeline.wait_idle(Duration::from_secs(10)).await);

    assert_eq!(log.count(), 1);
    assert_eq!(pipeline.stats().exhausted, 1);

    pipeline.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_outcomes_filter_skips_intermediate_failures() {
    let pipeline = Pipeline::new(test_config(), ScriptedHandler::new(Behavior::FailTimes(2)));
    let mut events = pipeline.subscribe("outcomes", EventFilter::TaskOutcomes).await;
    pipeline.mount().await.unwrap();

    pipeline.submit(group("flaky")).unwrap();
    assert!(pipeline.wait_idle(Duration::from_secs(10)).await);

    let outcome = next_task_event(&mut events, TaskEventType::Succeeded).await;
    assert_eq!(outcome.attempt, 3);
    assert!(events.try_recv().is_err());

    pipeline.destroy().await;
}
