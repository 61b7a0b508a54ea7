//! One decision pass: history in, decisions out.

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::activity_table::{ActivityStatus, ActivityTable};
use crate::context::DecisionContext;
use crate::decision::Decision;
use crate::error::{Result, WorkflowError, WorkflowResult, error_chain};
use crate::history::start_input;
use crate::payload::PayloadStore;
use crate::runtime::DeciderConfig;
use crate::transport::DecisionTask;
use crate::workflow::Workflow;

/// Decisions produced by one pass, ready for
/// [`respond_decision_task_completed`](crate::DecisionTransport::respond_decision_task_completed).
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutput {
    pub decisions: Vec<Decision>,
    /// Status marker set by the program, sent as the execution context.
    pub execution_context: Option<String>,
}

/// Runs workflow programs against decision tasks.
///
/// A pass:
/// 1. Reads the program input from the `WorkflowExecutionStarted` event
/// 2. Rebuilds the activity table from history
/// 3. Resolves externalized activity results through the payload store
/// 4. Runs the program once against a fresh [`DecisionContext`]
/// 5. Turns a program error into a `FailWorkflowExecution` decision
/// 6. Externalizes oversized schedule inputs
///
/// Suspension is not an error: the decisions made before the suspending
/// call are returned as is. A failure is appended after them rather than
/// replacing them.
#[derive(Debug, Clone)]
pub struct Decider {
    payloads: PayloadStore,
    config: DeciderConfig,
}

impl Decider {
    pub fn new(payloads: PayloadStore, config: DeciderConfig) -> Self {
        Self { payloads, config }
    }

    pub fn config(&self) -> &DeciderConfig {
        &self.config
    }

    /// Run `workflow` against `task`.
    ///
    /// Fails only when the history itself is unusable
    /// ([`Error::InvalidHistory`](crate::Error::InvalidHistory)); the task
    /// should then be left unanswered.
    pub async fn decide<W: Workflow>(
        &self,
        workflow: &W,
        task: &DecisionTask,
    ) -> Result<DecisionOutput> {
        self.decide_with(|ctx, input| workflow.run(ctx, input), task)
            .await
    }

    pub(crate) async fn decide_with<F>(&self, program: F, task: &DecisionTask) -> Result<DecisionOutput>
    where
        F: FnOnce(&mut DecisionContext, Value) -> WorkflowResult<()> + Send,
    {
        let input = start_input(&task.events)?;

        let mut table = ActivityTable::from_history(&task.events);
        self.resolve_results(&mut table).await;

        let mut ctx = DecisionContext::new(
            table,
            task.previous_started_event_id,
            self.config.clone(),
        );

        match program(&mut ctx, input) {
            Ok(()) => {
                debug!(
                    workflow_id = %task.workflow_execution.workflow_id,
                    decisions = ctx.decisions().len(),
                    "Workflow pass finished"
                );
            }
            Err(WorkflowError::Suspended) => {
                debug!(
                    workflow_id = %task.workflow_execution.workflow_id,
                    decisions = ctx.decisions().len(),
                    "Workflow pass suspended"
                );
            }
            Err(err) => {
                let stack = error_chain(&err);
                if matches!(err, WorkflowError::Nondeterminism(_)) {
                    error!(
                        workflow_id = %task.workflow_execution.workflow_id,
                        run_id = %task.workflow_execution.run_id,
                        error = %err,
                        "Nondeterministic workflow, failing execution"
                    );
                } else {
                    info!(
                        workflow_id = %task.workflow_execution.workflow_id,
                        error = %err,
                        "Workflow failed"
                    );
                }
                ctx.push_decision(Decision::fail_workflow(&err.to_string(), err.payload(), &stack));
            }
        }

        let (decisions, execution_context) = ctx.into_parts();
        let decisions = self.externalize_inputs(decisions).await;

        Ok(DecisionOutput {
            decisions,
            execution_context,
        })
    }

    /// Replace `{uri}` results with the payloads they point at.
    ///
    /// Only references to registered persisters are loaded. One that fails
    /// to load stays in place and is marked unresolved; the program suspends
    /// at that call and the next pass tries again.
    async fn resolve_results(&self, table: &mut ActivityTable) {
        let mut unresolved = Vec::new();
        for record in table.iter_mut() {
            if record.status != ActivityStatus::Completed {
                continue;
            }
            let Some(result) = record.result.take_if(|r| self.payloads.is_reference(r)) else {
                continue;
            };
            match self.payloads.load(result.clone()).await {
                Ok(loaded) => record.result = Some(loaded),
                Err(e) => {
                    warn!(activity_id = %record.key, error = %e, "Failed to load activity result");
                    record.result = Some(result);
                    unresolved.push(record.key.clone());
                }
            }
        }
        for key in unresolved {
            table.mark_unresolved(key);
        }
    }

    /// Move oversized schedule arguments to the payload store.
    ///
    /// A schedule whose arguments cannot be saved is dropped; the call is
    /// scheduled again on the next pass.
    async fn externalize_inputs(&self, decisions: Vec<Decision>) -> Vec<Decision> {
        let mut out = Vec::with_capacity(decisions.len());
        for decision in decisions {
            let (activity_id, activity_type, mut input, task_list) = match decision {
                Decision::ScheduleActivityTask {
                    activity_id,
                    activity_type,
                    input,
                    task_list,
                } => (activity_id, activity_type, input, task_list),
                other => {
                    out.push(other);
                    continue;
                }
            };

            let key = format!("{activity_id}.input");
            match self.payloads.save(&key, input.args).await {
                Ok(args) => {
                    input.args = args;
                    out.push(Decision::ScheduleActivityTask {
                        activity_id,
                        activity_type,
                        input,
                        task_list,
                    });
                }
                Err(e) => {
                    error!(
                        activity_id = %activity_id,
                        activity_type = %activity_type,
                        error = %e,
                        "Failed to save activity input, dropping schedule decision"
                    );
                }
            }
        }
        out
    }
}
