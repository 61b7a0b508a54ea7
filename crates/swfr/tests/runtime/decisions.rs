//! Decision workers answering decision tasks.

use std::time::Duration;

use serde_json::{Value, json};
use swfr::{CallKey, Decision};

use crate::support::DEFAULT_TEST_TIMEOUT;
use crate::support::activities::{Double, FanOut, Noop, Passthrough};
use crate::support::app::TestApp;
use crate::support::coordinator::Response;
use crate::support::execution::{Execution, scheduled_ids};

fn decisions_of(response: &Response) -> (&str, &[Decision], Option<&str>) {
    let Response::Decisions {
        task_token,
        decisions,
        execution_context,
    } = response
    else {
        panic!("expected a decision response, got {response:?}");
    };
    (task_token, decisions, execution_context.as_deref())
}

#[tokio::test(flavor = "multi_thread")]
async fn doubled_noop_runs_end_to_end() -> anyhow::Result<()> {
    let app = TestApp::builder().workflow(Double).activity(Noop).start()?;
    let coordinator = &app.coordinator;
    let mut execution = Execution::start::<Double>(json!(5));

    // Pass 1: schedule noop(5).
    let task = execution.decision_task();
    coordinator.push_decision_task(task.clone());
    let responses = coordinator.wait_for_responses(1, DEFAULT_TEST_TIMEOUT).await?;
    let (token, decisions, _) = decisions_of(&responses[0]);
    assert_eq!(token, task.task_token);
    let key = CallKey::compute("noop", "1.0", &json!([5]));
    assert_eq!(scheduled_ids(decisions), vec![key.as_str()]);
    execution.record(&task, decisions);

    // The activity worker runs it.
    coordinator.push_activity_task(execution.activity_task(&decisions[0]));
    let responses = coordinator.wait_for_responses(2, DEFAULT_TEST_TIMEOUT).await?;
    let Response::ActivityCompleted {
        result: Some(result),
        ..
    } = &responses[1]
    else {
        panic!("expected a completed activity, got {:?}", responses[1]);
    };
    execution.complete(key.as_str(), serde_json::from_str::<Value>(result)?);

    // Pass 2: complete with the doubled result.
    let task = execution.decision_task();
    coordinator.push_decision_task(task.clone());
    let responses = coordinator.wait_for_responses(3, DEFAULT_TEST_TIMEOUT).await?;
    let (_, decisions, _) = decisions_of(&responses[2]);
    assert_eq!(
        decisions,
        &[Decision::CompleteWorkflowExecution {
            result: Some(json!(10))
        }]
    );

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn status_marker_is_sent_as_execution_context() -> anyhow::Result<()> {
    let app = TestApp::builder()
        .workflow(FanOut { concurrency: 0 })
        .start()?;
    let mut execution = Execution::start::<FanOut>(json!([]));

    app.coordinator.push_decision_task(execution.decision_task());
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    let (_, _, execution_context) = decisions_of(&responses[0]);
    assert_eq!(execution_context, Some("0 branches done"));

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn unregistered_workflow_type_is_left_unanswered() -> anyhow::Result<()> {
    let app = TestApp::builder().workflow(Double).start()?;
    let mut execution = Execution::start::<Passthrough>(json!("x"));

    app.coordinator.push_decision_task(execution.decision_task());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(app.coordinator.responses().is_empty());
    assert!(app.coordinator.polls() >= 2, "worker kept polling after the task");

    app.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn poll_errors_back_off_and_recover() -> anyhow::Result<()> {
    let app = TestApp::builder().workflow(Double).start()?;
    app.coordinator.fail_next_polls(3);
    let mut execution = Execution::start::<Double>(json!(1));

    app.coordinator.push_decision_task(execution.decision_task());
    let responses = app
        .coordinator
        .wait_for_responses(1, DEFAULT_TEST_TIMEOUT)
        .await?;

    let (_, decisions, _) = decisions_of(&responses[0]);
    assert_eq!(decisions.len(), 1);

    app.shutdown().await
}
