//! A single workflow execution as the coordinator would record it.

use std::collections::HashMap;

use serde_json::Value;
use swfr::history::{
    ActivityTaskCompleted, ActivityTaskFailed, ActivityTaskScheduled, ActivityTaskStarted,
    ActivityTaskTimedOut, ScheduleActivityTaskFailed, WorkflowExecutionStarted,
};
use swfr::{
    ActivityTask, Decider, Decision, DecisionOutput, DecisionTask, EventKind, HistoryEvent,
    TypeRef, Versioned, Workflow, WorkflowExecution,
};

pub struct Execution {
    workflow_type: TypeRef,
    execution: WorkflowExecution,
    events: Vec<HistoryEvent>,
    previous_started: i64,
    /// Latest `ActivityTaskScheduled` event id per activity id.
    scheduled: HashMap<String, i64>,
    closed: Option<Decision>,
    tasks: usize,
}

impl Execution {
    /// A new execution of `W` started with `input`.
    pub fn start<W: Versioned>(input: Value) -> Self {
        let mut execution = Self {
            workflow_type: W::type_ref(),
            execution: WorkflowExecution::new("wf-1", "run-1"),
            events: Vec::new(),
            previous_started: 0,
            scheduled: HashMap::new(),
            closed: None,
            tasks: 0,
        };
        execution.push(EventKind::WorkflowExecutionStarted(WorkflowExecutionStarted {
            input: Some(input.to_string()),
            workflow_type: Some(W::type_ref()),
            task_list: None,
        }));
        execution
    }

    fn push(&mut self, kind: EventKind) -> i64 {
        let event_id = self.events.len() as i64 + 1;
        self.events.push(HistoryEvent::new(event_id, kind));
        event_id
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn closed(&self) -> Option<&Decision> {
        self.closed.as_ref()
    }

    /// Schedule and start a decision task over the history so far.
    pub fn decision_task(&mut self) -> DecisionTask {
        self.tasks += 1;
        self.push(EventKind::DecisionTaskScheduled);
        let started = self.push(EventKind::DecisionTaskStarted);
        DecisionTask {
            task_token: format!("decision-{}", self.tasks),
            workflow_type: self.workflow_type.clone(),
            workflow_execution: self.execution.clone(),
            previous_started_event_id: self.previous_started,
            started_event_id: started,
            events: self.events.clone(),
        }
    }

    /// Apply the decisions answering `task` to the history.
    pub fn record(&mut self, task: &DecisionTask, decisions: &[Decision]) {
        self.push(EventKind::DecisionTaskCompleted);
        self.previous_started = task.started_event_id;

        for decision in decisions {
            match decision {
                Decision::ScheduleActivityTask {
                    activity_id,
                    activity_type,
                    input,
                    task_list,
                } => {
                    let event_id = self.push(EventKind::ActivityTaskScheduled(ActivityTaskScheduled {
                        activity_id: activity_id.clone(),
                        activity_type: activity_type.clone(),
                        input: Some(serde_json::to_string(input).unwrap()),
                        task_list: Some(task_list.clone()),
                    }));
                    self.scheduled.insert(activity_id.clone(), event_id);
                }
                closing => self.closed = Some(closing.clone()),
            }
        }
    }

    /// Run one decision pass of `workflow` and record its decisions.
    pub async fn pass<W: Workflow>(&mut self, decider: &Decider, workflow: &W) -> DecisionOutput {
        let task = self.decision_task();
        let output = decider.decide(workflow, &task).await.unwrap();
        self.record(&task, &output.decisions);
        output
    }

    /// The activity task a worker would receive for a schedule decision.
    pub fn activity_task(&self, decision: &Decision) -> ActivityTask {
        let Decision::ScheduleActivityTask {
            activity_id,
            activity_type,
            input,
            ..
        } = decision
        else {
            panic!("expected a schedule decision, got {decision:?}");
        };
        ActivityTask {
            task_token: format!("activity-{activity_id}"),
            activity_id: activity_id.clone(),
            activity_type: activity_type.clone(),
            workflow_execution: self.execution.clone(),
            input: Some(serde_json::to_string(input).unwrap()),
        }
    }

    fn scheduled_event(&self, activity_id: &str) -> i64 {
        *self
            .scheduled
            .get(activity_id)
            .unwrap_or_else(|| panic!("activity {activity_id} was never scheduled"))
    }

    pub fn start_activity(&mut self, activity_id: &str) -> i64 {
        let scheduled_event_id = self.scheduled_event(activity_id);
        self.push(EventKind::ActivityTaskStarted(ActivityTaskStarted {
            scheduled_event_id,
            identity: Some("test-worker".into()),
        }))
    }

    pub fn complete(&mut self, activity_id: &str, result: Value) {
        self.complete_raw(activity_id, Some(result.to_string()));
    }

    pub fn complete_raw(&mut self, activity_id: &str, result: Option<String>) {
        let scheduled_event_id = self.scheduled_event(activity_id);
        let started = self.start_activity(activity_id);
        self.push(EventKind::ActivityTaskCompleted(ActivityTaskCompleted {
            scheduled_event_id,
            started_event_id: Some(started),
            result,
        }));
    }

    pub fn fail(&mut self, activity_id: &str, reason: &str, details: Value) {
        let scheduled_event_id = self.scheduled_event(activity_id);
        let started = self.start_activity(activity_id);
        self.push(EventKind::ActivityTaskFailed(ActivityTaskFailed {
            scheduled_event_id,
            started_event_id: Some(started),
            reason: Some(reason.into()),
            details: Some(details.to_string()),
        }));
    }

    pub fn time_out(&mut self, activity_id: &str) {
        let scheduled_event_id = self.scheduled_event(activity_id);
        let started = self.start_activity(activity_id);
        self.push(EventKind::ActivityTaskTimedOut(ActivityTaskTimedOut {
            scheduled_event_id,
            started_event_id: Some(started),
            timeout_type: "START_TO_CLOSE".into(),
            details: None,
        }));
    }

    /// The coordinator refused a schedule decision.
    pub fn reject_schedule(&mut self, decision: &Decision, cause: &str) {
        let Decision::ScheduleActivityTask {
            activity_id,
            activity_type,
            ..
        } = decision
        else {
            panic!("expected a schedule decision, got {decision:?}");
        };
        self.push(EventKind::ScheduleActivityTaskFailed(ScheduleActivityTaskFailed {
            activity_id: activity_id.clone(),
            activity_type: activity_type.clone(),
            cause: cause.into(),
        }));
    }
}

/// Activity ids of the schedule decisions, in order.
pub fn scheduled_ids(decisions: &[Decision]) -> Vec<&str> {
    decisions
        .iter()
        .filter_map(|d| match d {
            Decision::ScheduleActivityTask { activity_id, .. } => Some(activity_id.as_str()),
            _ => None,
        })
        .collect()
}

/// `reason` and decoded `details` of a `FailWorkflowExecution` decision.
pub fn failure(decision: &Decision) -> (String, Value) {
    let Decision::FailWorkflowExecution { reason, details } = decision else {
        panic!("expected a failure decision, got {decision:?}");
    };
    (reason.clone(), serde_json::from_str(details).unwrap())
}
