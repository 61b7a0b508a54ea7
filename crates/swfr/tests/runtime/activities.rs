//! Activity workers running handlers and reporting outcomes.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use serde_json::{Value, json};
use swfr::{
    ActivityTask, MemoryPersister, PayloadLimits, PayloadStore, RuntimeConfig, TypeRef,
    WorkflowExecution,
};

use crate::support::DEFAULT_TEST_TIMEOUT;
use crate::support::activities::{Flaky, Inflate, Noop, Slow};
use crate::support::app::{TestApp, test_runtime_config};
use crate::support::coordinator::Response;

fn activity_task(name: &str, input: Option<Value>) -> ActivityTask {
    ActivityTask {
        task_token: format!("tok-{name}"),
        activity_id: format!("id-{name}"),
        activity_type: TypeRef::new(name, "1.0"),
        workflow_execution: WorkflowExecution::new("wf-1", "run-1"),
        input: input.map(|v| v.to_string()),
    }
}

fn failed(response: &Response) -> (&str, Value) {
    let Response::ActivityFailed { reason, details, .. } = response else {
        panic!("expected a failed activity, got {response:?}");
    };
    (reason, serde_json::from_str(details).unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_activity_reports_json_result() -> anyhow::Result<()> {
    let app = TestApp::builder().activity(Noop).start()?;

    app.coordinator
        .push_activity_task(activity_task("noop", Some(json!({"args": [{"tile": 3}]}))));
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    assert_eq!(
        responses[0],
        Response::ActivityCompleted {
            task_token: "tok-noop".into(),
            result: Some(r#"{"tile":3}"#.into()),
        }
    );

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_input_means_no_arguments() -> anyhow::Result<()> {
    let app = TestApp::builder().activity(Noop).start()?;

    app.coordinator.push_activity_task(activity_task("noop", None));
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    assert_eq!(
        responses[0],
        Response::ActivityCompleted {
            task_token: "tok-noop".into(),
            result: Some("null".into()),
        }
    );

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_error_reports_reason_payload_and_stack() -> anyhow::Result<()> {
    let app = TestApp::builder().activity(Flaky).start()?;

    app.coordinator
        .push_activity_task(activity_task("flaky", Some(json!({"args": ["a"]}))));
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    let (reason, details) = failed(&responses[0]);
    assert_eq!(reason, r#"flaky gave up on ["a"]"#);
    assert_eq!(details["payload"], json!(["a"]));
    assert_eq!(details["stack"], json!(r#"flaky gave up on ["a"]: disk full"#));

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_activity_type_is_reported_failed() -> anyhow::Result<()> {
    let app = TestApp::builder().activity(Noop).start()?;

    app.coordinator
        .push_activity_task(activity_task("reproject", Some(json!({"args": [1]}))));
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    let (reason, details) = failed(&responses[0]);
    assert_eq!(reason, "Unable to locate activity: reproject@1.0");
    assert_eq!(details["payload"], json!([1]));

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_input_is_left_to_time_out() -> anyhow::Result<()> {
    let app = TestApp::builder().activity(Noop).start()?;

    let mut task = activity_task("noop", None);
    task.input = Some("{not json".into());
    app.coordinator.push_activity_task(task);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(app.coordinator.responses().is_empty());

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn long_activity_heartbeats_while_running() -> anyhow::Result<()> {
    let app = TestApp::builder()
        .activity(Slow {
            delay: Duration::from_millis(200),
            calls: Arc::new(AtomicUsize::new(0)),
        })
        .config(RuntimeConfig {
            heartbeat_interval: Duration::from_millis(30),
            ..test_runtime_config()
        })
        .start()?;

    app.coordinator.push_activity_task(activity_task("slow", None));
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    assert!(matches!(responses[0], Response::ActivityCompleted { .. }));
    let heartbeats = app.coordinator.heartbeats();
    assert!(heartbeats >= 3, "expected several heartbeats, got {heartbeats}");

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn large_result_is_returned_by_reference() -> anyhow::Result<()> {
    let persister = MemoryPersister::new();
    let payloads = PayloadStore::new()
        .with_external(persister.clone())
        .with_limits(PayloadLimits {
            inline_limit: 64,
            external_limit: 4096,
        });
    let app = TestApp::builder_with_payloads(payloads.clone())
        .activity(Inflate)
        .start()?;

    app.coordinator
        .push_activity_task(activity_task("inflate", Some(json!({"args": [500]}))));
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    let Response::ActivityCompleted {
        result: Some(result),
        ..
    } = &responses[0]
    else {
        panic!("expected a completed activity, got {:?}", responses[0]);
    };
    let reference: Value = serde_json::from_str(result)?;
    let uri = reference["uri"].as_str().unwrap_or_default();
    assert!(uri.starts_with("memory://payloads/id-inflate."), "{uri}");
    assert!(uri.ends_with(".result"), "{uri}");
    assert_eq!(payloads.load(reference).await?, json!("x".repeat(500)));

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn same_call_in_two_executions_keeps_separate_results() -> anyhow::Result<()> {
    let payloads = PayloadStore::in_memory().with_limits(PayloadLimits {
        inline_limit: 0,
        external_limit: 4096,
    });
    let app = TestApp::builder_with_payloads(payloads.clone())
        .activity(Slow {
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        })
        .start()?;

    // Same call key, two executions: only the task tokens differ.
    for (token, workflow_id) in [("tok-a", "wf-a"), ("tok-b", "wf-b")] {
        let mut task = activity_task("slow", None);
        task.task_token = token.into();
        task.workflow_execution = WorkflowExecution::new(workflow_id, "run-1");
        app.coordinator.push_activity_task(task);
    }
    let responses = app
        .coordinator
        .wait_for_responses(2, DEFAULT_TEST_TIMEOUT)
        .await?;

    let mut results = Vec::new();
    for response in &responses {
        let Response::ActivityCompleted {
            task_token,
            result: Some(result),
        } = response
        else {
            panic!("expected a completed activity, got {response:?}");
        };
        let reference: Value = serde_json::from_str(result)?;
        results.push((task_token.clone(), reference));
    }
    assert_ne!(results[0].1, results[1].1);

    let mut loaded = Vec::new();
    for (_, reference) in results {
        loaded.push(payloads.load(reference).await?);
    }
    loaded.sort_by_key(|v| v.as_u64());
    assert_eq!(loaded, vec![json!(1), json!(2)]);

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn result_beyond_every_limit_fails_the_activity() -> anyhow::Result<()> {
    let payloads = PayloadStore::in_memory().with_limits(PayloadLimits {
        inline_limit: 64,
        external_limit: 256,
    });
    let app = TestApp::builder_with_payloads(payloads)
        .activity(Inflate)
        .start()?;

    app.coordinator
        .push_activity_task(activity_task("inflate", Some(json!({"args": [1000]}))));
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    let (reason, details) = failed(&responses[0]);
    assert!(reason.starts_with("payload for task id-inflate."), "{reason}");
    assert!(reason.contains(".result is too large"), "{reason}");
    assert_eq!(details["payload"], json!([1000]));

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn externalized_arguments_are_loaded_for_the_handler() -> anyhow::Result<()> {
    let persister = MemoryPersister::new();
    let payloads = PayloadStore::new()
        .with_external(persister)
        .with_limits(PayloadLimits {
            // Above the 24-byte result, below the 26-byte argument array.
            inline_limit: 25,
            external_limit: 4096,
        });
    let args = payloads
        .save("id-noop.input", json!(["a long enough argument"]))
        .await?;
    let app = TestApp::builder_with_payloads(payloads).activity(Noop).start()?;

    app.coordinator
        .push_activity_task(activity_task("noop", Some(json!({ "args": args }))));
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    assert_eq!(
        responses[0],
        Response::ActivityCompleted {
            task_token: "tok-noop".into(),
            result: Some(r#""a long enough argument""#.into()),
        }
    );

    app.shutdown().await
}
