//! Decision worker for answering decision tasks.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::registry::WorkerRuntime;
use super::{sleep_or_shutdown, stop_requested};
use crate::error::Error;
use crate::transport::{ActivityTransport, DecisionTask, DecisionTransport};

/// Decision worker that long-polls the decision task list.
///
/// The worker holds at most one decision task at a time.
///
/// # Lifecycle
///
/// 1. Long-poll for a decision task on `decision_task_list`
/// 2. Look up the workflow by `workflowType`
/// 3. Replay the program against the task's history
/// 4. Respond with the pass's decisions and status marker
/// 5. Repeat until shutdown signal
///
/// Poll errors back off exponentially. Tasks that cannot be decided
/// (unknown workflow type, unusable history) are logged and left
/// unanswered so the coordinator times them out.
pub(crate) struct DecisionWorker<T> {
    runtime: Arc<WorkerRuntime<T>>,
    identity: String,
}

impl<T> DecisionWorker<T>
where
    T: DecisionTransport + ActivityTransport,
{
    /// Create a new decision worker.
    pub fn new(runtime: Arc<WorkerRuntime<T>>, identity: String) -> Self {
        Self { runtime, identity }
    }

    /// Run the decision worker until shutdown signal.
    ///
    /// A shutdown abandons the outstanding poll immediately. A task that
    /// was already received is decided and answered first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let task_list = self.runtime.config.decision_task_list.clone();
        let mut failures = 0u32;

        info!(worker = %self.identity, task_list = %task_list, "Decision worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                polled = self.runtime.transport.poll_for_decision_task(&task_list, &self.identity) => polled,
                changed = shutdown.changed() => {
                    if stop_requested(changed, &shutdown) {
                        break;
                    }
                    continue;
                }
            };

            match polled {
                Ok(Some(task)) if !task.task_token.is_empty() => {
                    failures = 0;
                    self.process(task).await;
                }
                Ok(_) => {
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    let delay = self.runtime.config.poll_backoff(failures);
                    warn!(
                        worker = %self.identity,
                        error = %e,
                        failures,
                        backoff_ms = delay.as_millis() as u64,
                        "Decision task poll failed"
                    );
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(worker = %self.identity, "Decision worker shutting down");
    }

    /// Decide one task and respond.
    async fn process(&self, task: DecisionTask) {
        debug!(
            workflow_id = %task.workflow_execution.workflow_id,
            workflow_type = %task.workflow_type,
            events = task.events.len(),
            previous_started_event_id = task.previous_started_event_id,
            "Processing decision task"
        );

        let output = match self.runtime.decide(&task).await {
            Ok(output) => output,
            Err(Error::UnknownWorkflowType(workflow_type)) => {
                warn!(
                    workflow_id = %task.workflow_execution.workflow_id,
                    workflow_type = %workflow_type,
                    "No workflow registered for decision task, leaving it unanswered"
                );
                return;
            }
            Err(e) => {
                error!(
                    workflow_id = %task.workflow_execution.workflow_id,
                    error = %e,
                    "Failed to decide, leaving task unanswered"
                );
                return;
            }
        };

        let count = output.decisions.len();
        match self
            .runtime
            .transport
            .respond_decision_task_completed(
                &task.task_token,
                output.decisions,
                output.execution_context,
            )
            .await
        {
            Ok(()) => {
                debug!(
                    workflow_id = %task.workflow_execution.workflow_id,
                    decisions = count,
                    "Decision task completed"
                );
            }
            Err(e) => {
                error!(
                    workflow_id = %task.workflow_execution.workflow_id,
                    error = %e,
                    "Failed to respond to decision task"
                );
            }
        }
    }
}
