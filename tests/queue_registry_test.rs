//! Registry-level behaviour: scheduling rules, blocking execution,
//! cancellation and configuration

use loadagent_config::{ConfigLoader, QueueConfig};
use loadagent_core::{ActionRequest, ComponentRepository, InvokeError, QueueState};
use loadagent_execution::{
    ExecutionPattern, PatternError, QueueError, QueueRegistry, QueueSubmission,
};
use serde_json::Value as JsonValue;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

async fn noop(_args: Vec<JsonValue>) -> Result<JsonValue, String> {
    Ok(JsonValue::Null)
}

async fn slow(_args: Vec<JsonValue>) -> Result<JsonValue, String> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(JsonValue::Null)
}

async fn fail(_args: Vec<JsonValue>) -> Result<JsonValue, String> {
    Err("component error".to_string())
}

fn components() -> Arc<ComponentRepository> {
    let mut repository = ComponentRepository::new();
    repository
        .register_action("app", "noop", None, noop)
        .register_action("app", "slow", None, slow)
        .register_action("app", "fail", None, fail)
        .register_action("app", "login", Some(2), noop);
    Arc::new(repository)
}

fn registry() -> QueueRegistry {
    QueueRegistry::new(components(), QueueConfig::default())
}

fn submission(name: &str, action: &str, pattern: ExecutionPattern) -> QueueSubmission {
    QueueSubmission::new(name, vec![ActionRequest::new("app", action)], pattern)
}

#[tokio::test]
async fn test_blocking_execute_returns_after_all_invocations() {
    let registry = registry();

    let queue = registry
        .execute_actions(submission(
            "blocking",
            "noop",
            ExecutionPattern::all_at_once(5, 1).blocking(true),
        ))
        .await
        .unwrap();

    assert_eq!(queue.state(), QueueState::Finished);
    let snapshot = registry.statistics().snapshot("blocking").unwrap();
    assert_eq!(snapshot.invocations_succeeded, 5);
    assert_eq!(snapshot.invocations_failed, 0);
    assert_eq!(registry.running_queues_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_running_queue_is_rejected() {
    let registry = registry();
    let first = registry
        .execute_actions(submission(
            "Q1",
            "noop",
            ExecutionPattern::all_at_once(2, 1).infinite().with_interval(50),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(registry.is_queue_running("Q1"));

    let err = registry
        .schedule_actions(submission("Q1", "noop", ExecutionPattern::all_at_once(3, 1)))
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::AlreadyExists { ref name, state: QueueState::Running } if name == "Q1"
    ));
    assert!(err.to_string().contains("already exists"));

    // the running queue is untouched
    let still_running = registry.queue("Q1").unwrap();
    assert!(Arc::ptr_eq(&first, &still_running));
    assert_eq!(still_running.worker_snapshots().len(), 2);

    registry.cancel_all_queues().await;
    assert_eq!(first.state(), QueueState::Canceled);
}

#[tokio::test]
async fn test_finished_queue_name_can_be_reused() {
    let registry = registry();
    let pattern = ExecutionPattern::all_at_once(1, 2).blocking(true);

    let first = registry
        .execute_actions(submission("reuse", "noop", pattern.clone()))
        .await
        .unwrap();
    let second = registry
        .execute_actions(submission("reuse", "noop", pattern))
        .await
        .unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(second.state(), QueueState::Finished);
    // counters start over for the new queue
    assert_eq!(
        registry.statistics().snapshot("reuse").unwrap().invocations_succeeded,
        2
    );
}

#[tokio::test]
async fn test_resolution_errors_prevent_queue_creation() {
    let registry = registry();

    let cases = vec![
        ActionRequest::new("nowhere", "noop"),
        ActionRequest::new("app", "missing"),
        ActionRequest::new("app", "login").with_literal("only-user"),
    ];
    for request in cases {
        let err = registry
            .schedule_actions(QueueSubmission::new(
                "unresolved",
                vec![ActionRequest::new("app", "noop"), request],
                ExecutionPattern::all_at_once(1, 1),
            ))
            .unwrap_err();
        match err {
            QueueError::Resolution(e) => assert!(e.is_resolution_error()),
            other => panic!("unexpected error: {other}"),
        }
    }

    assert!(registry.queue("unresolved").is_none());
    assert!(matches!(
        registry.start_queue("unresolved").await,
        Err(QueueError::NoSuchQueue(_))
    ));
}

#[tokio::test]
async fn test_invocation_failures_are_recorded_not_raised() {
    let registry = registry();

    let queue = registry
        .execute_actions(QueueSubmission::new(
            "failing",
            vec![
                ActionRequest::new("app", "fail"),
                ActionRequest::new("app", "noop"),
            ],
            ExecutionPattern::all_at_once(2, 3)
                .blocking(true)
                .with_pass_rate(50.0),
        ))
        .await
        .unwrap();

    assert_eq!(queue.state(), QueueState::Finished);
    let snapshot = queue.statistics().snapshot();
    assert_eq!(snapshot.invocations_failed, 6);
    assert_eq!(snapshot.invocations_succeeded, 0);
    assert_eq!(snapshot.iterations_failed, 6);
    assert!(!snapshot.passed);
    assert_eq!(snapshot.actions["app.fail"].failed, 6);
    assert!(!snapshot.actions.contains_key("app.noop"));
}

#[tokio::test(start_paused = true)]
async fn test_completed_count_is_stable_after_cancel_all() {
    let registry = registry();
    for name in ["left", "right"] {
        registry
            .execute_actions(submission(
                name,
                "slow",
                ExecutionPattern::ramp_up(4, 2, 250, 1).infinite(),
            ))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(registry.running_queues_count(), 2);

    registry.cancel_all_queues().await;
    assert_eq!(registry.running_queues_count(), 0);

    let settled: Vec<u64> = ["left", "right"]
        .iter()
        .map(|name| registry.queue(name).unwrap().statistics().invocations_completed())
        .collect();
    assert!(settled.iter().all(|count| *count > 0));

    tokio::time::sleep(Duration::from_secs(10)).await;
    let later: Vec<u64> = ["left", "right"]
        .iter()
        .map(|name| registry.queue(name).unwrap().statistics().invocations_completed())
        .collect();
    assert_eq!(settled, later);

    for name in ["left", "right"] {
        assert_eq!(registry.queue_state(name), Some(QueueState::Canceled));
        let stats = registry.queue(name).unwrap().statistics();
        // in-flight invocations were allowed to finish
        assert_eq!(stats.invocations_started(), stats.invocations_completed());
    }
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_all_queues_finish() {
    let registry = registry();
    registry
        .execute_actions(submission("short", "slow", ExecutionPattern::all_at_once(2, 2)))
        .await
        .unwrap();
    registry
        .execute_actions(submission(
            "long",
            "slow",
            ExecutionPattern::all_at_once(1, 1).for_duration(2),
        ))
        .await
        .unwrap();
    registry
        .schedule_actions(submission("idle", "noop", ExecutionPattern::all_at_once(1, 1)))
        .unwrap();

    registry.wait_until_queue_finish("short").await;
    assert_eq!(registry.queue_state("short"), Some(QueueState::Finished));

    registry.wait_until_all_queues_finish().await;
    assert_eq!(registry.queue_state("long"), Some(QueueState::Finished));
    // never started, so nothing to wait for
    assert_eq!(registry.queue_state("idle"), Some(QueueState::Scheduled));
    assert_eq!(registry.running_queues_count(), 0);
}

#[tokio::test]
async fn test_registry_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "queues:\n  max_threads_per_queue: 4\n  cancel_timeout: 5\n  default_caller: nightly"
    )
    .unwrap();

    let config = ConfigLoader::with_prefix("LOADAGENT_REGISTRY_TEST")
        .from_file(file.path())
        .unwrap();
    let registry = QueueRegistry::from_config(components(), config.queues).unwrap();
    assert_eq!(registry.config().cancel_timeout, Duration::from_secs(5));

    let err = registry
        .schedule_actions(submission("wide", "noop", ExecutionPattern::all_at_once(5, 1)))
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidPattern(PatternError::TooManyThreads {
            requested: 5,
            limit: 4
        })
    ));

    let queue = registry
        .schedule_actions(submission("narrow", "noop", ExecutionPattern::all_at_once(4, 1)))
        .unwrap();
    assert_eq!(queue.caller(), "nightly");

    let invalid = QueueConfig {
        max_threads_per_queue: 0,
        ..QueueConfig::default()
    };
    assert!(matches!(
        QueueRegistry::from_config(components(), invalid),
        Err(QueueError::Configuration(_))
    ));
}

#[test]
fn test_invoke_error_display() {
    let err = InvokeError::NoSuchAction {
        component: "app".into(),
        action: "missing".into(),
    };
    assert!(err.to_string().contains("missing"));
}
