//! Activity worker for running scheduled activities.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use super::registry::WorkerRuntime;
use super::{sleep_or_shutdown, stop_requested};
use crate::activity::{ActivityContext, ActivityEntry, HandlerFailure};
use crate::decision::{ActivityInput, MAX_REASON_LEN, failure_details, truncate};
use crate::error::{Result, error_chain};
use crate::transport::{ActivityTask, ActivityTransport, DecisionTransport};

/// Activity worker that long-polls the activity task list.
///
/// # Lifecycle
///
/// 1. Long-poll for an activity task on `activity_task_list`
/// 2. Decode the `{args, key}` input and load externalized args
/// 3. Look up the handler by `activityType`
/// 4. Run the handler, heartbeating every `heartbeat_interval`
/// 5. Externalize the result if needed (see [`result_key`]) and respond
///    completed, or respond failed
/// 6. Repeat until shutdown signal
///
/// Input that cannot be decoded or loaded is logged and the task is left
/// to time out.
pub(crate) struct ActivityWorker<T> {
    runtime: Arc<WorkerRuntime<T>>,
    identity: String,
}

impl<T> ActivityWorker<T>
where
    T: DecisionTransport + ActivityTransport,
{
    /// Create a new activity worker.
    pub fn new(runtime: Arc<WorkerRuntime<T>>, identity: String) -> Self {
        Self { runtime, identity }
    }

    /// Run the activity worker until shutdown signal.
    ///
    /// A shutdown abandons the outstanding poll immediately. An activity
    /// that is already running finishes and is reported first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let task_list = self.runtime.config.activity_task_list.clone();
        let mut failures = 0u32;

        info!(worker = %self.identity, task_list = %task_list, "Activity worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                polled = self.runtime.transport.poll_for_activity_task(&task_list, &self.identity) => polled,
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
                    let activity_id = task.activity_id.clone();
                    if let Err(e) = self.process(task).await {
                        error!(activity_id = %activity_id, error = %e, "Failed to report activity outcome");
                    }
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
                        "Activity task poll failed"
                    );
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(worker = %self.identity, "Activity worker shutting down");
    }

    /// Run one activity task and report its outcome.
    async fn process(&self, task: ActivityTask) -> Result<()> {
        let transport = &self.runtime.transport;

        debug!(
            activity_id = %task.activity_id,
            activity_type = %task.activity_type,
            workflow_id = %task.workflow_execution.workflow_id,
            "Processing activity task"
        );

        let input = match task.input.as_deref() {
            None => ActivityInput {
                args: Value::Array(Vec::new()),
                key: None,
            },
            Some(raw) => match serde_json::from_str::<ActivityInput>(raw) {
                Ok(input) => input,
                Err(e) => {
                    error!(activity_id = %task.activity_id, error = %e, "Malformed activity input, leaving task to time out");
                    return Ok(());
                }
            },
        };

        let args = match self.runtime.payloads.load(input.args.clone()).await {
            Ok(Value::Array(items)) => items,
            Ok(Value::Null) => Vec::new(),
            Ok(other) => vec![other],
            Err(e) => {
                error!(activity_id = %task.activity_id, error = %e, "Failed to load activity input, leaving task to time out");
                return Ok(());
            }
        };

        let Some(entry) = self.runtime.activities.get(&task.activity_type) else {
            let reason = format!("Unable to locate activity: {}", task.activity_type);
            warn!(activity_id = %task.activity_id, "{reason}");
            return transport
                .respond_activity_task_failed(
                    &task.task_token,
                    &reason,
                    &failure_details(input.args, &reason),
                )
                .await;
        };

        let ctx = ActivityContext::new(
            task.task_token.clone(),
            task.activity_id.clone(),
            task.activity_type.clone(),
            task.workflow_execution.clone(),
            OffsetDateTime::now_utc(),
        );

        match self.run_with_heartbeat(entry, args, &ctx).await {
            Ok(result) => {
                match self.runtime.payloads.save(&result_key(&task), result).await {
                    Ok(result) => {
                        debug!(activity_id = %task.activity_id, "Activity completed");
                        transport
                            .respond_activity_task_completed(&task.task_token, Some(result.to_string()))
                            .await
                    }
                    Err(e) => {
                        error!(activity_id = %task.activity_id, error = %e, "Failed to save activity result");
                        transport
                            .respond_activity_task_failed(
                                &task.task_token,
                                &truncate(&e.to_string(), MAX_REASON_LEN),
                                &failure_details(input.args, &error_chain(&e)),
                            )
                            .await
                    }
                }
            }
            Err(HandlerFailure { reason, stack }) => {
                info!(activity_id = %task.activity_id, reason = %reason, "Activity failed");
                transport
                    .respond_activity_task_failed(
                        &task.task_token,
                        &truncate(&reason, MAX_REASON_LEN),
                        &failure_details(input.args, &stack),
                    )
                    .await
            }
        }
    }

    /// Drive the handler to completion, heartbeating while it runs.
    async fn run_with_heartbeat(
        &self,
        entry: &dyn ActivityEntry,
        args: Vec<Value>,
        ctx: &ActivityContext,
    ) -> std::result::Result<Value, HandlerFailure> {
        let period = self.runtime.config.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handler = entry.run(args, ctx);
        tokio::pin!(handler);

        loop {
            tokio::select! {
                outcome = &mut handler => return outcome,
                _ = heartbeat.tick() => {
                    if let Err(e) = self.runtime.transport.record_heartbeat(&ctx.task_token).await {
                        warn!(activity_id = %ctx.activity_id, error = %e, "Heartbeat failed");
                    }
                }
            }
        }
    }
}

/// Storage key for the result of one activity attempt.
///
/// The activity id alone is shared by every execution making the same call,
/// so the key also carries a digest of the task token, which is unique per
/// attempt.
fn result_key(task: &ActivityTask) -> String {
    let token = Sha256::digest(task.task_token.as_bytes());
    format!("{}.{token:x}.result", task.activity_id)
}
