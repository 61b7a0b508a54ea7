//! Workflow history events as delivered with a decision task.
//!
//! The coordinator sends each event as
//! `{"eventId": .., "eventType": "ActivityTaskCompleted", "activityTaskCompletedEventAttributes": {..}}`.
//! [`HistoryEvent`] decodes that shape into a closed [`EventKind`]; event types
//! the engine does not act on land in [`EventKind::Unrecognized`] instead of
//! failing the whole task.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::workflow::{TaskList, TypeRef};

/// One entry of a workflow execution history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct HistoryEvent {
    /// Monotonic position in the history, starting at 1.
    pub event_id: i64,
    /// What happened.
    pub kind: EventKind,
}

impl HistoryEvent {
    pub fn new(event_id: i64, kind: EventKind) -> Self {
        Self { event_id, kind }
    }
}

/// The event types the decider understands.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    WorkflowExecutionStarted(WorkflowExecutionStarted),
    ActivityTaskScheduled(ActivityTaskScheduled),
    ActivityTaskStarted(ActivityTaskStarted),
    ActivityTaskCompleted(ActivityTaskCompleted),
    ActivityTaskFailed(ActivityTaskFailed),
    ActivityTaskTimedOut(ActivityTaskTimedOut),
    ScheduleActivityTaskFailed(ScheduleActivityTaskFailed),
    FailWorkflowExecutionFailed(FailWorkflowExecutionFailed),
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted,
    DecisionTaskTimedOut,
    /// Any event type not listed above.
    Unrecognized { event_type: String },
}

impl EventKind {
    /// The coordinator's name for this event type.
    pub fn event_type(&self) -> &str {
        match self {
            EventKind::WorkflowExecutionStarted(_) => "WorkflowExecutionStarted",
            EventKind::ActivityTaskScheduled(_) => "ActivityTaskScheduled",
            EventKind::ActivityTaskStarted(_) => "ActivityTaskStarted",
            EventKind::ActivityTaskCompleted(_) => "ActivityTaskCompleted",
            EventKind::ActivityTaskFailed(_) => "ActivityTaskFailed",
            EventKind::ActivityTaskTimedOut(_) => "ActivityTaskTimedOut",
            EventKind::ScheduleActivityTaskFailed(_) => "ScheduleActivityTaskFailed",
            EventKind::FailWorkflowExecutionFailed(_) => "FailWorkflowExecutionFailed",
            EventKind::DecisionTaskScheduled => "DecisionTaskScheduled",
            EventKind::DecisionTaskStarted => "DecisionTaskStarted",
            EventKind::DecisionTaskCompleted => "DecisionTaskCompleted",
            EventKind::DecisionTaskTimedOut => "DecisionTaskTimedOut",
            EventKind::Unrecognized { event_type } => event_type,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionStarted {
    /// JSON-encoded start input.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub workflow_type: Option<TypeRef>,
    #[serde(default)]
    pub task_list: Option<TaskList>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTaskScheduled {
    pub activity_id: String,
    pub activity_type: TypeRef,
    /// JSON-encoded `{"args": .., "key": ..}` envelope.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub task_list: Option<TaskList>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTaskStarted {
    pub scheduled_event_id: i64,
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTaskCompleted {
    pub scheduled_event_id: i64,
    #[serde(default)]
    pub started_event_id: Option<i64>,
    /// JSON-encoded result.
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTaskFailed {
    pub scheduled_event_id: i64,
    #[serde(default)]
    pub started_event_id: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    /// JSON-encoded details object.
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTaskTimedOut {
    pub scheduled_event_id: i64,
    #[serde(default)]
    pub started_event_id: Option<i64>,
    pub timeout_type: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleActivityTaskFailed {
    pub activity_id: String,
    pub activity_type: TypeRef,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailWorkflowExecutionFailed {
    pub cause: String,
}

/// Wire shape of an event before its attributes are typed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    event_id: i64,
    event_type: String,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl TryFrom<RawEvent> for HistoryEvent {
    type Error = serde_json::Error;

    fn try_from(mut raw: RawEvent) -> std::result::Result<Self, Self::Error> {
        let attributes = raw
            .rest
            .remove(&attributes_key(&raw.event_type))
            .unwrap_or_else(|| Value::Object(Map::new()));

        let kind = match raw.event_type.as_str() {
            "WorkflowExecutionStarted" => {
                EventKind::WorkflowExecutionStarted(serde_json::from_value(attributes)?)
            }
            "ActivityTaskScheduled" => {
                EventKind::ActivityTaskScheduled(serde_json::from_value(attributes)?)
            }
            "ActivityTaskStarted" => {
                EventKind::ActivityTaskStarted(serde_json::from_value(attributes)?)
            }
            "ActivityTaskCompleted" => {
                EventKind::ActivityTaskCompleted(serde_json::from_value(attributes)?)
            }
            "ActivityTaskFailed" => EventKind::ActivityTaskFailed(serde_json::from_value(attributes)?),
            "ActivityTaskTimedOut" => {
                EventKind::ActivityTaskTimedOut(serde_json::from_value(attributes)?)
            }
            "ScheduleActivityTaskFailed" => {
                EventKind::ScheduleActivityTaskFailed(serde_json::from_value(attributes)?)
            }
            "FailWorkflowExecutionFailed" => {
                EventKind::FailWorkflowExecutionFailed(serde_json::from_value(attributes)?)
            }
            "DecisionTaskScheduled" => EventKind::DecisionTaskScheduled,
            "DecisionTaskStarted" => EventKind::DecisionTaskStarted,
            "DecisionTaskCompleted" => EventKind::DecisionTaskCompleted,
            "DecisionTaskTimedOut" => EventKind::DecisionTaskTimedOut,
            _ => EventKind::Unrecognized {
                event_type: raw.event_type,
            },
        };

        Ok(HistoryEvent {
            event_id: raw.event_id,
            kind,
        })
    }
}

/// `ActivityTaskScheduled` -> `activityTaskScheduledEventAttributes`.
fn attributes_key(event_type: &str) -> String {
    let mut chars = event_type.chars();
    let mut key = String::with_capacity(event_type.len() + 15);
    if let Some(first) = chars.next() {
        key.extend(first.to_lowercase());
    }
    key.extend(chars);
    key.push_str("EventAttributes");
    key
}

/// Extract the program input from the first history event.
///
/// The first event must be `WorkflowExecutionStarted`. An absent input is
/// JSON `null`; an input that is not valid JSON is logged and also treated
/// as `null`.
pub fn start_input(events: &[HistoryEvent]) -> Result<Value> {
    let Some(first) = events.first() else {
        return Err(Error::InvalidHistory("history is empty".into()));
    };

    let EventKind::WorkflowExecutionStarted(started) = &first.kind else {
        return Err(Error::InvalidHistory(format!(
            "first event is {}, expected WorkflowExecutionStarted",
            first.kind.event_type()
        )));
    };

    let Some(input) = started.input.as_deref() else {
        return Ok(Value::Null);
    };

    match serde_json::from_str(input) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(event_id = first.event_id, error = %e, "Malformed workflow input, using null");
            Ok(Value::Null)
        }
    }
}
