//! Per-call activity records rebuilt from history.
//!
//! The table is the only state a decision pass starts from. It is built by
//! a single ordered walk over the history and keeps exactly one record per
//! logical call: when a call is rescheduled the new `ActivityTaskScheduled`
//! event supersedes the old record and inherits its attempt count.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::call_key::CallKey;
use crate::decision::ActivityInput;
use crate::history::{EventKind, HistoryEvent};
use crate::workflow::TypeRef;

/// Lifecycle position of one activity call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStatus {
    Scheduled,
    Started,
    Completed,
    Failed,
    TimedOut,
    /// The coordinator rejected the schedule decision itself.
    ScheduleFailed,
}

/// How an activity call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Failed,
    TimedOut,
    ScheduleFailed,
}

/// A recorded activity failure, surfaced to workflow code once retries are
/// exhausted.
///
/// `details` holds the structured attributes the worker reported next to
/// the reason (for a worker built on this crate, `payload` and `stack`).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct ActivityFailure {
    pub kind: FailureKind,
    pub reason: String,
    pub details: Map<String, Value>,
}

impl ActivityFailure {
    fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            details: Map::new(),
        }
    }
}

/// Everything history says about one logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub key: CallKey,
    pub activity_type: TypeRef,
    /// Positional args as scheduled (possibly an external reference).
    pub args: Value,
    pub status: ActivityStatus,
    /// Id of the latest event that touched this record.
    pub last_event_id: i64,
    /// Number of times a worker picked the call up.
    pub attempts: u32,
    /// Decoded result once completed. `None` means the worker sent no result.
    pub result: Option<Value>,
    pub failure: Option<ActivityFailure>,
}

/// All activity records of one execution.
#[derive(Debug, Clone, Default)]
pub struct ActivityTable {
    records: HashMap<i64, ActivityRecord>,
    by_key: HashMap<CallKey, i64>,
    unresolved: HashSet<CallKey>,
}

impl ActivityTable {
    /// Build the table from an ordered history.
    ///
    /// Never fails: malformed payloads and events pointing at unknown
    /// schedules are logged and skipped.
    pub fn from_history(events: &[HistoryEvent]) -> Self {
        let mut table = Self::default();
        for event in events {
            table.apply(event);
        }
        table
    }

    /// Look up the record for a call.
    pub fn get(&self, key: &CallKey) -> Option<&ActivityRecord> {
        self.by_key.get(key).and_then(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityRecord> {
        self.records.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActivityRecord> {
        self.records.values_mut()
    }

    /// `true` for a completed call whose externalized result failed to load.
    pub fn is_unresolved(&self, key: &CallKey) -> bool {
        self.unresolved.contains(key)
    }

    pub(crate) fn mark_unresolved(&mut self, key: CallKey) {
        self.unresolved.insert(key);
    }

    fn apply(&mut self, event: &HistoryEvent) {
        let event_id = event.event_id;
        match &event.kind {
            EventKind::ActivityTaskScheduled(attrs) => {
                let (key, args) = decode_schedule_input(
                    attrs.input.as_deref(),
                    &attrs.activity_type,
                    &attrs.activity_id,
                    event_id,
                );
                let attempts = self.evict(&key).map_or(0, |old| old.attempts);
                self.insert(
                    event_id,
                    ActivityRecord {
                        key,
                        activity_type: attrs.activity_type.clone(),
                        args,
                        status: ActivityStatus::Scheduled,
                        last_event_id: event_id,
                        attempts,
                        result: None,
                        failure: None,
                    },
                );
            }
            EventKind::ActivityTaskStarted(attrs) => {
                if let Some(record) = self.by_schedule(attrs.scheduled_event_id, event) {
                    record.status = ActivityStatus::Started;
                    record.last_event_id = event_id;
                    record.attempts += 1;
                }
            }
            EventKind::ActivityTaskCompleted(attrs) => {
                if let Some(record) = self.by_schedule(attrs.scheduled_event_id, event) {
                    record.status = ActivityStatus::Completed;
                    record.last_event_id = event_id;
                    record.result = attrs.result.as_deref().and_then(|raw| {
                        serde_json::from_str(raw)
                            .inspect_err(|e| {
                                warn!(event_id, error = %e, "Malformed activity result, using null");
                            })
                            .ok()
                    });
                }
            }
            EventKind::ActivityTaskFailed(attrs) => {
                if let Some(record) = self.by_schedule(attrs.scheduled_event_id, event) {
                    let mut failure = ActivityFailure::new(
                        FailureKind::Failed,
                        attrs.reason.clone().unwrap_or_default(),
                    );
                    failure.details = decode_details(attrs.details.as_deref(), event_id);
                    record.status = ActivityStatus::Failed;
                    record.last_event_id = event_id;
                    record.failure = Some(failure);
                }
            }
            EventKind::ActivityTaskTimedOut(attrs) => {
                if let Some(record) = self.by_schedule(attrs.scheduled_event_id, event) {
                    record.status = ActivityStatus::TimedOut;
                    record.last_event_id = event_id;
                    record.failure = Some(ActivityFailure::new(
                        FailureKind::TimedOut,
                        attrs.timeout_type.clone(),
                    ));
                }
            }
            EventKind::ScheduleActivityTaskFailed(attrs) => {
                let key = CallKey::from_raw(attrs.activity_id.clone());
                let previous = self.evict(&key);
                let (attempts, args) = previous.map_or((0, Value::Null), |old| (old.attempts, old.args));
                self.insert(
                    event_id,
                    ActivityRecord {
                        key,
                        activity_type: attrs.activity_type.clone(),
                        args,
                        status: ActivityStatus::ScheduleFailed,
                        last_event_id: event_id,
                        attempts,
                        result: None,
                        failure: Some(ActivityFailure::new(
                            FailureKind::ScheduleFailed,
                            attrs.cause.clone(),
                        )),
                    },
                );
            }
            EventKind::FailWorkflowExecutionFailed(attrs) => {
                warn!(event_id, cause = %attrs.cause, "Coordinator rejected a workflow failure decision");
            }
            EventKind::WorkflowExecutionStarted(_)
            | EventKind::DecisionTaskScheduled
            | EventKind::DecisionTaskStarted
            | EventKind::DecisionTaskCompleted
            | EventKind::DecisionTaskTimedOut => {}
            EventKind::Unrecognized { event_type } => {
                debug!(event_id, event_type = %event_type, "No handler for history event");
            }
        }
    }

    fn insert(&mut self, event_id: i64, record: ActivityRecord) {
        self.by_key.insert(record.key.clone(), event_id);
        self.records.insert(event_id, record);
    }

    fn evict(&mut self, key: &CallKey) -> Option<ActivityRecord> {
        let id = self.by_key.remove(key)?;
        self.records.remove(&id)
    }

    fn by_schedule(&mut self, scheduled_event_id: i64, event: &HistoryEvent) -> Option<&mut ActivityRecord> {
        let record = self.records.get_mut(&scheduled_event_id);
        if record.is_none() {
            warn!(
                event_id = event.event_id,
                event_type = event.kind.event_type(),
                scheduled_event_id,
                "History event references an unknown schedule"
            );
        }
        record
    }
}

/// Recover the call key and args from a scheduled event's input.
///
/// Prefers the key carried in the envelope; without one the key is
/// recomputed from the args, and without parseable args the activity id is
/// the key.
fn decode_schedule_input(
    input: Option<&str>,
    activity_type: &TypeRef,
    activity_id: &str,
    event_id: i64,
) -> (CallKey, Value) {
    let envelope = input.and_then(|raw| {
        serde_json::from_str::<ActivityInput>(raw)
            .inspect_err(|e| warn!(event_id, error = %e, "Malformed activity input"))
            .ok()
    });

    match envelope {
        Some(ActivityInput { args, key: Some(key) }) => (key, args),
        Some(ActivityInput { args, key: None }) => (
            CallKey::compute(&activity_type.name, &activity_type.version, &args),
            args,
        ),
        None => (CallKey::from_raw(activity_id), Value::Null),
    }
}

fn decode_details(details: Option<&str>, event_id: i64) -> Map<String, Value> {
    let Some(raw) = details else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            let mut map = Map::new();
            map.insert("details".into(), other);
            map
        }
        Err(e) => {
            warn!(event_id, error = %e, "Malformed failure details");
            Map::new()
        }
    }
}
