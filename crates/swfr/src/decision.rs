//! Decisions returned to the coordinator at the end of a pass.

use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Value, json};

use crate::call_key::CallKey;
use crate::workflow::{TaskList, TypeRef};

/// Coordinator limit on `FailWorkflowExecution.reason`.
pub const MAX_REASON_LEN: usize = 256;

/// Coordinator limit on `FailWorkflowExecution.details`.
pub const MAX_DETAILS_LEN: usize = 32_768;

/// Input envelope of a scheduled activity.
///
/// Serialized as the `input` string of `ScheduleActivityTask`. `args` is the
/// positional argument array, or a `{"uri": ..}` reference once the payload
/// store has externalized it. `key` lets the history parser recover the
/// content address without rehashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityInput {
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<CallKey>,
}

/// One decision of a decision-task response.
///
/// Serializes to the coordinator's wire shape:
///
/// ```text
/// {"decisionType": "ScheduleActivityTask",
///  "scheduleActivityTaskDecisionAttributes": {...}}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    ScheduleActivityTask {
        activity_id: String,
        activity_type: TypeRef,
        input: ActivityInput,
        task_list: TaskList,
    },
    CompleteWorkflowExecution {
        result: Option<Value>,
    },
    FailWorkflowExecution {
        reason: String,
        details: String,
    },
}

impl Decision {
    /// Build a terminal failure, truncating to the coordinator's limits.
    ///
    /// `details` is the JSON string of `{"payload": .., "stack": ..}`.
    pub fn fail_workflow(reason: &str, payload: Value, stack: &str) -> Self {
        Decision::FailWorkflowExecution {
            reason: truncate(reason, MAX_REASON_LEN),
            details: failure_details(payload, stack),
        }
    }

    /// The coordinator's name for this decision type.
    pub fn decision_type(&self) -> &'static str {
        match self {
            Decision::ScheduleActivityTask { .. } => "ScheduleActivityTask",
            Decision::CompleteWorkflowExecution { .. } => "CompleteWorkflowExecution",
            Decision::FailWorkflowExecution { .. } => "FailWorkflowExecution",
        }
    }

    /// Returns `true` for `ScheduleActivityTask`.
    pub fn is_schedule(&self) -> bool {
        matches!(self, Decision::ScheduleActivityTask { .. })
    }
}

impl Serialize for Decision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Schedule<'a> {
            activity_id: &'a str,
            activity_type: &'a TypeRef,
            input: String,
            task_list: &'a TaskList,
        }

        #[derive(Serialize)]
        struct Complete {
            #[serde(skip_serializing_if = "Option::is_none")]
            result: Option<String>,
        }

        #[derive(Serialize)]
        struct Fail<'a> {
            reason: &'a str,
            details: &'a str,
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("decisionType", self.decision_type())?;
        match self {
            Decision::ScheduleActivityTask {
                activity_id,
                activity_type,
                input,
                task_list,
            } => {
                let input = serde_json::to_string(input).map_err(S::Error::custom)?;
                map.serialize_entry(
                    "scheduleActivityTaskDecisionAttributes",
                    &Schedule {
                        activity_id,
                        activity_type,
                        input,
                        task_list,
                    },
                )?;
            }
            Decision::CompleteWorkflowExecution { result } => {
                let result = result.as_ref().map(Value::to_string);
                map.serialize_entry(
                    "completeWorkflowExecutionDecisionAttributes",
                    &Complete { result },
                )?;
            }
            Decision::FailWorkflowExecution { reason, details } => {
                map.serialize_entry(
                    "failWorkflowExecutionDecisionAttributes",
                    &Fail { reason, details },
                )?;
            }
        }
        map.end()
    }
}

/// JSON string of `{"payload": .., "stack": ..}` of at most [`MAX_DETAILS_LEN`]
/// chars.
///
/// Fields are cut before serializing so the result always parses. The stack
/// gives way first. A payload too large to fit on its own is replaced by a
/// prefix of its JSON text, and the stack then keeps at most a quarter of the
/// limit.
pub(crate) fn failure_details(payload: Value, stack: &str) -> String {
    let details = render_details(&payload, stack);
    if fits(&details) {
        return details;
    }

    let (payload, stack_cap) = if fits(&render_details(&payload, "")) {
        (payload, stack.chars().count())
    } else {
        let empty = Value::String(String::new());
        let stack_cap = fit_budget(MAX_DETAILS_LEN / 4, |n| {
            render_details(&empty, &truncate(stack, n))
        });
        let stack = truncate(stack, stack_cap);
        let text = payload.to_string();
        let budget = fit_budget(MAX_DETAILS_LEN, |n| {
            render_details(&Value::String(truncate(&text, n)), &stack)
        });
        (Value::String(truncate(&text, budget)), stack_cap)
    };

    let budget = fit_budget(stack_cap, |n| render_details(&payload, &truncate(stack, n)));
    render_details(&payload, &truncate(stack, budget))
}

fn render_details(payload: &Value, stack: &str) -> String {
    json!({ "payload": payload, "stack": stack }).to_string()
}

fn fits(details: &str) -> bool {
    details.chars().count() <= MAX_DETAILS_LEN
}

/// Largest `n <= cap` for which `render(n)` fits. `render(0)` must fit.
fn fit_budget(cap: usize, render: impl Fn(usize) -> String) -> usize {
    if fits(&render(cap)) {
        return cap;
    }
    let (mut lo, mut hi) = (0, cap);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if fits(&render(mid)) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}
