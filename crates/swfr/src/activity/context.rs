//! Activity execution context with correlation and idempotency metadata.

use time::OffsetDateTime;

use crate::workflow::{TypeRef, WorkflowExecution};

/// Context provided to activity handlers during execution.
///
/// # Idempotency
///
/// Activities have **at-least-once** semantics: a task that times out or
/// fails is scheduled again under the same activity id. Use
/// [`idempotency_key()`](Self::idempotency_key) when calling external APIs
/// that support idempotency keys.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    /// Coordinator token of this task attempt.
    pub task_token: String,

    /// Content address of the call. Stable across attempts.
    pub activity_id: String,

    pub activity_type: TypeRef,

    /// The execution that scheduled this activity.
    pub workflow_execution: WorkflowExecution,

    /// When this worker picked the task up.
    pub started_at: OffsetDateTime,
}

impl ActivityContext {
    pub fn new(
        task_token: impl Into<String>,
        activity_id: impl Into<String>,
        activity_type: TypeRef,
        workflow_execution: WorkflowExecution,
        started_at: OffsetDateTime,
    ) -> Self {
        Self {
            task_token: task_token.into(),
            activity_id: activity_id.into(),
            activity_type,
            workflow_execution,
            started_at,
        }
    }

    /// Get the idempotency key for external service calls.
    ///
    /// Format: `{workflow_id}:{activity_id}`
    ///
    /// The same for every attempt of the same call, different for different
    /// calls or executions.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.workflow_execution.workflow_id, self.activity_id)
    }
}
