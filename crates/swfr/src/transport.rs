//! Boundary to the workflow coordinator.
//!
//! The crate never talks to a coordinator directly. Workers poll and respond
//! through these traits, so any long-poll service with decision and
//! activity task queues can be plugged in.

use async_trait::async_trait;
use serde::Deserialize;

use crate::decision::Decision;
use crate::error::Result;
use crate::history::HistoryEvent;
use crate::workflow::{TypeRef, WorkflowExecution};

/// A decision task: the full history of one execution, up to now.
///
/// Transports are responsible for assembling every history page before
/// handing the task over.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTask {
    pub task_token: String,
    pub workflow_type: TypeRef,
    pub workflow_execution: WorkflowExecution,
    /// Started event id of the previous decision task, `0` for the first one.
    #[serde(default)]
    pub previous_started_event_id: i64,
    #[serde(default)]
    pub started_event_id: i64,
    pub events: Vec<HistoryEvent>,
}

/// An activity task: one scheduled call to run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTask {
    pub task_token: String,
    pub activity_id: String,
    pub activity_type: TypeRef,
    pub workflow_execution: WorkflowExecution,
    /// JSON-encoded `{"args": .., "key": ..}` envelope.
    #[serde(default)]
    pub input: Option<String>,
}

/// Decision-side operations of a coordinator.
#[async_trait]
pub trait DecisionTransport: Send + Sync + 'static {
    /// Long-poll for the next decision task.
    ///
    /// `Ok(None)` (or a task with an empty token) means the poll expired
    /// without work.
    async fn poll_for_decision_task(
        &self,
        task_list: &str,
        identity: &str,
    ) -> Result<Option<DecisionTask>>;

    /// Answer a decision task.
    async fn respond_decision_task_completed(
        &self,
        task_token: &str,
        decisions: Vec<Decision>,
        execution_context: Option<String>,
    ) -> Result<()>;
}

/// Activity-side operations of a coordinator.
#[async_trait]
pub trait ActivityTransport: Send + Sync + 'static {
    /// Long-poll for the next activity task.
    async fn poll_for_activity_task(
        &self,
        task_list: &str,
        identity: &str,
    ) -> Result<Option<ActivityTask>>;

    /// Report that the task is still being worked on.
    async fn record_heartbeat(&self, task_token: &str) -> Result<()>;

    /// Report success with the JSON-encoded result.
    async fn respond_activity_task_completed(
        &self,
        task_token: &str,
        result: Option<String>,
    ) -> Result<()>;

    /// Report failure.
    async fn respond_activity_task_failed(
        &self,
        task_token: &str,
        reason: &str,
        details: &str,
    ) -> Result<()>;
}
