//! Scheduling, resolution and replay of activity calls.

use serde_json::json;
use swfr::{CallKey, Decider, DeciderConfig, Decision, PayloadStore};

use crate::support::activities::{Double, FanOut, Sweep};
use crate::support::execution::{Execution, scheduled_ids};
use crate::support::logs::capture_logs;

fn decider() -> Decider {
    Decider::new(PayloadStore::in_memory(), DeciderConfig::default())
}

fn noop_key(arg: i64) -> String {
    CallKey::compute("noop", "1.0", &json!([arg])).into_inner()
}

#[tokio::test]
async fn doubled_noop_schedules_then_completes() {
    let decider = decider();
    let mut execution = Execution::start::<Double>(json!(5));

    let first = execution.pass(&decider, &Double).await;
    assert_eq!(scheduled_ids(&first.decisions), vec![noop_key(5).as_str()]);
    let Decision::ScheduleActivityTask {
        activity_type,
        input,
        task_list,
        ..
    } = &first.decisions[0]
    else {
        panic!("expected a schedule decision");
    };
    assert_eq!(activity_type.to_string(), "noop@1.0");
    assert_eq!(input.args, json!([5]));
    assert_eq!(task_list.name, "defaultTaskList");

    execution.complete(&noop_key(5), json!(5));
    let second = execution.pass(&decider, &Double).await;

    assert_eq!(
        second.decisions,
        vec![Decision::CompleteWorkflowExecution {
            result: Some(json!(10))
        }]
    );
}

#[tokio::test]
async fn pending_call_is_never_scheduled_twice() {
    let decider = decider();
    let mut execution = Execution::start::<Double>(json!(5));

    let first = execution.pass(&decider, &Double).await;
    assert_eq!(first.decisions.len(), 1);

    // Scheduled but not picked up yet.
    let second = execution.pass(&decider, &Double).await;
    assert!(second.decisions.is_empty());

    // Picked up by a worker, still running.
    execution.start_activity(&noop_key(5));
    let third = execution.pass(&decider, &Double).await;
    assert!(third.decisions.is_empty());
    assert!(execution.closed().is_none());
}

#[tokio::test]
async fn replaying_the_same_history_is_deterministic() {
    let decider = decider();
    let mut execution = Execution::start::<FanOut>(json!([3, 4, 5]));
    let fan_out = FanOut { concurrency: 0 };

    execution.pass(&decider, &fan_out).await;
    execution.complete(&noop_key(4), json!(4));

    let task = execution.decision_task();
    let a = decider.decide(&fan_out, &task).await.unwrap();
    let b = decider.decide(&fan_out, &task).await.unwrap();

    assert_eq!(a, b);
    assert!(a.decisions.is_empty(), "branches 3 and 5 are still in flight");
}

#[tokio::test]
async fn two_branch_fan_out_schedules_each_branch_in_order() {
    let decider = decider();
    let mut execution = Execution::start::<FanOut>(json!([0, 1]));
    let fan_out = FanOut { concurrency: 0 };

    let first = execution.pass(&decider, &fan_out).await;
    assert_eq!(
        scheduled_ids(&first.decisions),
        vec![noop_key(0).as_str(), noop_key(1).as_str()]
    );

    execution.complete(&noop_key(1), json!(1));
    execution.complete(&noop_key(0), json!(0));
    let second = execution.pass(&decider, &fan_out).await;

    assert_eq!(
        second.decisions,
        vec![Decision::CompleteWorkflowExecution {
            result: Some(json!(1))
        }]
    );
    assert_eq!(second.execution_context.as_deref(), Some("2 branches done"));
}

#[tokio::test]
async fn fan_out_keeps_to_its_concurrency() {
    let decider = decider();
    let mut execution = Execution::start::<FanOut>(json!([10, 20, 30]));
    let fan_out = FanOut { concurrency: 2 };

    let first = execution.pass(&decider, &fan_out).await;
    assert_eq!(
        scheduled_ids(&first.decisions),
        vec![noop_key(10).as_str(), noop_key(20).as_str()]
    );

    execution.complete(&noop_key(10), json!(10));
    let second = execution.pass(&decider, &fan_out).await;
    assert_eq!(scheduled_ids(&second.decisions), vec![noop_key(30).as_str()]);

    execution.complete(&noop_key(20), json!(20));
    execution.complete(&noop_key(30), json!(30));
    let third = execution.pass(&decider, &fan_out).await;
    assert_eq!(
        third.decisions,
        vec![Decision::CompleteWorkflowExecution {
            result: Some(json!(60))
        }]
    );
}

#[tokio::test]
async fn polling_loop_keeps_to_the_in_flight_limit() {
    let decider = Decider::new(
        PayloadStore::in_memory(),
        DeciderConfig {
            max_concurrency: 2,
            ..DeciderConfig::default()
        },
    );
    let mut execution = Execution::start::<Sweep>(json!([1, 2, 3]));

    let first = execution.pass(&decider, &Sweep).await;
    assert_eq!(
        scheduled_ids(&first.decisions),
        vec![noop_key(1).as_str(), noop_key(2).as_str()]
    );

    let second = execution.pass(&decider, &Sweep).await;
    assert!(second.decisions.is_empty());

    execution.complete(&noop_key(1), json!(1));
    let third = execution.pass(&decider, &Sweep).await;
    assert_eq!(scheduled_ids(&third.decisions), vec![noop_key(3).as_str()]);

    execution.complete(&noop_key(2), json!(2));
    execution.complete(&noop_key(3), json!(3));
    let fourth = execution.pass(&decider, &Sweep).await;
    assert_eq!(
        fourth.decisions,
        vec![Decision::CompleteWorkflowExecution {
            result: Some(json!([1, 2, 3]))
        }]
    );
}

#[tokio::test]
async fn rejected_schedule_is_retried_under_the_same_key() {
    let decider = decider();
    let mut execution = Execution::start::<Double>(json!(5));

    let first = execution.pass(&decider, &Double).await;
    execution.reject_schedule(&first.decisions[0], "OPEN_ACTIVITIES_LIMIT_EXCEEDED");

    let second = execution.pass(&decider, &Double).await;
    assert_eq!(scheduled_ids(&second.decisions), vec![noop_key(5).as_str()]);

    execution.complete(&noop_key(5), json!(5));
    let third = execution.pass(&decider, &Double).await;
    assert_eq!(
        third.decisions,
        vec![Decision::CompleteWorkflowExecution {
            result: Some(json!(10))
        }]
    );
}

#[tokio::test]
async fn empty_fan_out_completes_in_one_pass() {
    let decider = decider();
    let mut execution = Execution::start::<FanOut>(json!([]));
    let fan_out = FanOut { concurrency: 0 };

    let output = execution.pass(&decider, &fan_out).await;

    assert_eq!(
        output.decisions,
        vec![Decision::CompleteWorkflowExecution {
            result: Some(json!(0))
        }]
    );
}

#[tokio::test]
async fn workflow_logs_are_suppressed_while_replaying() {
    let decider = decider();
    let mut execution = Execution::start::<Double>(json!(5));

    {
        let (_guard, logs) = capture_logs();
        execution.pass(&decider, &Double).await;
        assert!(logs.contents().contains("doubling"));
    }

    execution.complete(&noop_key(5), json!(5));

    let (_guard, logs) = capture_logs();
    execution.pass(&decider, &Double).await;
    let output = logs.contents();
    assert!(!output.contains("doubling"), "replayed log leaked: {output}");
    assert!(output.contains("noop answered 5"));
}
