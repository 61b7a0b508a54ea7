//! The decision context: what a workflow program talks to during a pass.
//!
//! Every activity call goes through [`DecisionContext::invoke`]. The call is
//! hashed into a [`CallKey`] and looked up in the [`ActivityTable`] rebuilt
//! from history:
//!
//! | Recorded status             | Outcome                                     |
//! |-----------------------------|---------------------------------------------|
//! | none                        | schedule, [`CallOutcome::Pending`]          |
//! | `Scheduled` / `Started`     | [`CallOutcome::Pending`]                    |
//! | `Completed`                 | [`CallOutcome::Resolved`], `Pending` while an external result fails to load |
//! | `Failed` / `TimedOut`       | reschedule, or [`CallOutcome::Failed`] once `attempts >= retries` |
//! | `ScheduleFailed`            | reschedule                                  |
//!
//! A pass keeps at most [`DeciderConfig::max_concurrency`] calls in flight
//! (scheduled in this pass or still running). New calls past that ceiling
//! stay `Pending` and are scheduled by a later pass.
//!
//! Pending calls surface as [`WorkflowError::Suspended`] through
//! [`ActivityCall::call`], so `?` ends the pass at the first call that has
//! no answer yet.

use std::collections::HashSet;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::activity_table::{ActivityFailure, ActivityStatus, ActivityTable, FailureKind};
use crate::call_key::CallKey;
use crate::decision::{ActivityInput, Decision};
use crate::error::{WorkflowError, WorkflowResult};
use crate::payload::payload_uri;
use crate::runtime::{DeciderConfig, MAX_CONCURRENCY};
use crate::workflow::{TaskList, TypeRef, Versioned};

/// The answer to one activity call in the current pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The activity completed; this is its result.
    Resolved(Value),
    /// The activity failed with no retries left.
    Failed(ActivityFailure),
    /// No answer yet. The call is scheduled or in flight.
    Pending,
}

impl CallOutcome {
    /// Convert into a `?`-friendly result.
    ///
    /// `Pending` becomes [`WorkflowError::Suspended`], `Failed` becomes
    /// [`WorkflowError::Activity`].
    pub fn into_result<R: DeserializeOwned>(self) -> WorkflowResult<R> {
        match self {
            CallOutcome::Resolved(value) => Ok(serde_json::from_value(value)?),
            CallOutcome::Failed(failure) => Err(WorkflowError::Activity(failure)),
            CallOutcome::Pending => Err(WorkflowError::Suspended),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CallOutcome::Pending)
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Attempts allowed before a failure is surfaced. Defaults to
    /// [`DeciderConfig::default_retries`].
    pub retries: Option<u32>,
    /// Task list to schedule on. Defaults to
    /// [`DeciderConfig::default_task_list`].
    pub task_list: Option<String>,
}

/// State of one decision pass.
///
/// Built fresh for every decision task and discarded after the response is
/// sent.
#[derive(Debug)]
pub struct DecisionContext {
    table: ActivityTable,
    decisions: Vec<Decision>,
    scheduled: HashSet<CallKey>,
    in_flight: HashSet<CallKey>,
    previous_started_event_id: i64,
    replaying: bool,
    live: bool,
    status: Option<String>,
    user_data: Map<String, Value>,
    config: DeciderConfig,
}

impl DecisionContext {
    /// Create a context over a parsed history.
    ///
    /// The pass starts out replaying whenever an earlier decision task was
    /// started (`previous_started_event_id != 0`).
    pub fn new(table: ActivityTable, previous_started_event_id: i64, config: DeciderConfig) -> Self {
        Self {
            table,
            decisions: Vec::new(),
            scheduled: HashSet::new(),
            in_flight: HashSet::new(),
            previous_started_event_id,
            replaying: previous_started_event_id != 0,
            live: false,
            status: None,
            user_data: Map::new(),
            config,
        }
    }

    /// Start building a call to `name@version`.
    pub fn activity(&mut self, name: &str, version: &str) -> ActivityCall<'_> {
        ActivityCall {
            ctx: self,
            activity_type: TypeRef::new(name, version),
            options: CallOptions::default(),
        }
    }

    /// Start building a call to a [`Versioned`] activity type.
    pub fn activity_of<A: Versioned>(&mut self) -> ActivityCall<'_> {
        ActivityCall {
            ctx: self,
            activity_type: A::type_ref(),
            options: CallOptions::default(),
        }
    }

    /// Resolve one call against history, scheduling it when needed.
    ///
    /// `args` is the positional argument array; any other value is wrapped
    /// as a single argument. Only non-determinism is reported as an error.
    pub fn invoke(
        &mut self,
        activity_type: TypeRef,
        args: Value,
        options: CallOptions,
    ) -> WorkflowResult<CallOutcome> {
        let args = match args {
            Value::Array(_) => args,
            other => Value::Array(vec![other]),
        };
        let key = CallKey::compute(&activity_type.name, &activity_type.version, &args);
        let retries = options.retries.unwrap_or(self.config.default_retries);

        if self.scheduled.contains(&key) {
            return Ok(CallOutcome::Pending);
        }

        if let Some(record) = self.table.get(&key) {
            if !self.live {
                self.replaying = record.last_event_id <= self.previous_started_event_id;
            }

            if record.activity_type != activity_type {
                return Err(WorkflowError::Nondeterminism(format!(
                    "call {key} was recorded as {} but requested as {activity_type}",
                    record.activity_type
                )));
            }
            if record.args != args && !record.args.is_null() && payload_uri(&record.args).is_none() {
                return Err(WorkflowError::Nondeterminism(format!(
                    "call {key} to {activity_type} was recorded with different arguments"
                )));
            }

            match record.status {
                ActivityStatus::Completed => {
                    if self.table.is_unresolved(&key) {
                        warn!(activity_id = %key, "Activity result is still an unresolved reference");
                        return Ok(CallOutcome::Pending);
                    }
                    return Ok(CallOutcome::Resolved(
                        record.result.clone().unwrap_or(Value::Null),
                    ));
                }
                ActivityStatus::Failed | ActivityStatus::TimedOut if record.attempts >= retries => {
                    let failure = record.failure.clone().unwrap_or_else(|| ActivityFailure {
                        kind: if record.status == ActivityStatus::TimedOut {
                            FailureKind::TimedOut
                        } else {
                            FailureKind::Failed
                        },
                        reason: "activity failed".into(),
                        details: Map::new(),
                    });
                    return Ok(CallOutcome::Failed(failure));
                }
                ActivityStatus::Scheduled | ActivityStatus::Started => {
                    self.in_flight.insert(key);
                    return Ok(CallOutcome::Pending);
                }
                ActivityStatus::Failed | ActivityStatus::TimedOut | ActivityStatus::ScheduleFailed => {
                    debug!(
                        activity_id = %key,
                        activity_type = %activity_type,
                        attempts = record.attempts,
                        retries,
                        "Rescheduling activity"
                    );
                }
            }
        }

        let limit = self.config.max_concurrency.clamp(1, MAX_CONCURRENCY);
        if self.in_flight.len() >= limit {
            debug!(
                activity_id = %key,
                activity_type = %activity_type,
                limit,
                "In-flight limit reached, deferring activity"
            );
            return Ok(CallOutcome::Pending);
        }

        let task_list = options
            .task_list
            .unwrap_or_else(|| self.config.default_task_list.clone());
        self.schedule(key, activity_type, args, task_list);
        Ok(CallOutcome::Pending)
    }

    fn schedule(&mut self, key: CallKey, activity_type: TypeRef, args: Value, task_list: String) {
        self.replaying = false;
        self.live = true;
        debug!(activity_id = %key, activity_type = %activity_type, "Scheduling activity");
        self.scheduled.insert(key.clone());
        self.in_flight.insert(key.clone());
        self.decisions.push(Decision::ScheduleActivityTask {
            activity_id: key.as_str().to_owned(),
            activity_type,
            input: ActivityInput {
                args,
                key: Some(key),
            },
            task_list: TaskList::new(task_list),
        });
    }

    /// Run `f` over `items` as parallel branches.
    ///
    /// Branches run in order. A branch that suspends keeps one of
    /// `concurrency` slots busy and later branches only start while a slot is
    /// free; `0` means [`DeciderConfig::max_concurrency`] and anything above
    /// [`MAX_CONCURRENCY`] is clamped. Once a branch fails no further branch
    /// starts.
    ///
    /// Returns the first failure, otherwise [`WorkflowError::Suspended`] if any
    /// branch is pending or was not started, otherwise every result in input
    /// order.
    pub fn map<T, R, F>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        concurrency: usize,
        mut f: F,
    ) -> WorkflowResult<Vec<R>>
    where
        F: FnMut(&mut Self, T) -> WorkflowResult<R>,
    {
        let limit = match concurrency {
            0 => self.config.max_concurrency,
            n => n,
        }
        .clamp(1, MAX_CONCURRENCY);

        let mut results = Vec::new();
        let mut in_flight = 0;
        let mut incomplete = false;

        for item in items {
            if in_flight >= limit {
                incomplete = true;
                break;
            }
            match f(self, item) {
                Ok(result) => results.push(result),
                Err(WorkflowError::Suspended) => {
                    in_flight += 1;
                    incomplete = true;
                }
                Err(err) => return Err(err),
            }
        }

        if incomplete {
            return Err(WorkflowError::Suspended);
        }
        Ok(results)
    }

    /// Complete the workflow execution with `result`.
    pub fn complete<T: Serialize>(&mut self, result: T) -> WorkflowResult<()> {
        let result = serde_json::to_value(result)?;
        self.decisions.push(Decision::CompleteWorkflowExecution {
            result: (!result.is_null()).then_some(result),
        });
        Ok(())
    }

    /// Log from workflow code. Suppressed while replaying.
    pub fn log(&self, message: impl std::fmt::Display) {
        if !self.replaying {
            info!(target: "swfr::workflow", "{message}");
        }
    }

    /// `true` while the program is re-executing calls decided by earlier passes.
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Set the status marker sent back as the execution context.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Free-form scratch space for the current pass.
    pub fn user_data(&self) -> &Map<String, Value> {
        &self.user_data
    }

    pub fn user_data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.user_data
    }

    /// Decisions accumulated so far in this pass.
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// The activity records this pass started from.
    pub fn activities(&self) -> &ActivityTable {
        &self.table
    }

    pub(crate) fn push_decision(&mut self, decision: Decision) {
        self.decisions.push(decision);
    }

    pub(crate) fn into_parts(self) -> (Vec<Decision>, Option<String>) {
        (self.decisions, self.status)
    }
}

/// Builder for a single activity call.
///
/// ```ignore
/// let tiles: Vec<String> = ctx
///     .activity("split", "1.0")
///     .retries(3)
///     .task_list("gdal")
///     .call((source_uri, 256))?;
/// ```
#[must_use = "an activity call does nothing until `call` or `poll` is invoked"]
pub struct ActivityCall<'a> {
    ctx: &'a mut DecisionContext,
    activity_type: TypeRef,
    options: CallOptions,
}

impl ActivityCall<'_> {
    /// Attempts allowed before failures are surfaced.
    pub fn retries(mut self, retries: u32) -> Self {
        self.options.retries = Some(retries);
        self
    }

    /// Task list to schedule on.
    pub fn task_list(mut self, task_list: impl Into<String>) -> Self {
        self.options.task_list = Some(task_list.into());
        self
    }

    /// Resolve the call without short-circuiting on `Pending`.
    ///
    /// `args` must serialize to the positional argument array (a tuple, a
    /// `Vec`, or a single value that becomes the only argument).
    pub fn poll<A: Serialize>(self, args: A) -> WorkflowResult<CallOutcome> {
        let args = serde_json::to_value(args)?;
        self.ctx.invoke(self.activity_type, args, self.options)
    }

    /// Resolve the call, suspending the pass if it has no answer yet.
    pub fn call<A: Serialize, R: DeserializeOwned>(self, args: A) -> WorkflowResult<R> {
        self.poll(args)?.into_result()
    }
}
