//! Workflow and activity registries and the runtime builder.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use super::activity_worker::ActivityWorker;
use super::config::RuntimeConfig;
use super::decision_worker::DecisionWorker;
use crate::activity::{ActivityEntry, ActivityHandler};
use crate::context::DecisionContext;
use crate::decider::{Decider, DecisionOutput};
use crate::error::{Error, Result, WorkflowResult};
use crate::payload::PayloadStore;
use crate::transport::{ActivityTransport, DecisionTask, DecisionTransport};
use crate::workflow::{TypeRef, Workflow};

/// Type-erased workflow entry for dynamic dispatch.
///
/// This trait allows the registry to store different workflow types
/// in a single HashMap.
pub(crate) trait WorkflowEntry: Send + Sync {
    fn workflow_type(&self) -> TypeRef;

    /// Run one decision pass of this workflow.
    fn run_pass(&self, ctx: &mut DecisionContext, input: Value) -> WorkflowResult<()>;
}

impl<W: Workflow> WorkflowEntry for W {
    fn workflow_type(&self) -> TypeRef {
        W::type_ref()
    }

    fn run_pass(&self, ctx: &mut DecisionContext, input: Value) -> WorkflowResult<()> {
        Workflow::run(self, ctx, input)
    }
}

/// Registry mapping `{name, version}` to entries.
pub(crate) struct Registry<E: ?Sized> {
    entries: HashMap<TypeRef, Box<E>>,
}

impl<E: ?Sized> Registry<E> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert an entry. Returns `false` if the type was already registered.
    fn insert(&mut self, type_ref: TypeRef, entry: Box<E>) -> bool {
        if self.entries.contains_key(&type_ref) {
            return false;
        }
        self.entries.insert(type_ref, entry);
        true
    }

    pub(crate) fn get(&self, type_ref: &TypeRef) -> Option<&E> {
        self.entries.get(type_ref).map(Box::as_ref)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for constructing a [`WorkerRuntime`].
///
/// Use this to register workflows and activities and configure the runtime
/// before starting.
///
/// # Example
///
/// ```ignore
/// let runtime = WorkerRuntime::builder(transport, PayloadStore::in_memory())
///     .register_workflow(TileWorkflow)
///     .register_activity(Reproject)
///     .register_activity(Split)
///     .config(RuntimeConfig {
///         activity_workers: 4,
///         ..Default::default()
///     })
///     .build()?;
/// ```
pub struct WorkerBuilder<T> {
    transport: Arc<T>,
    payloads: PayloadStore,
    workflows: Registry<dyn WorkflowEntry>,
    activities: Registry<dyn ActivityEntry>,
    duplicate: Option<Error>,
    config: RuntimeConfig,
}

impl<T> WorkerBuilder<T>
where
    T: DecisionTransport + ActivityTransport,
{
    fn new(transport: Arc<T>, payloads: PayloadStore) -> Self {
        Self {
            transport,
            payloads,
            workflows: Registry::new(),
            activities: Registry::new(),
            duplicate: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Register a workflow program under its `{name, version}`.
    ///
    /// Defers duplicate type checks until build time.
    pub fn register_workflow<W: Workflow>(mut self, workflow: W) -> Self {
        let entry: Box<dyn WorkflowEntry> = Box::new(workflow);
        let type_ref = entry.workflow_type();
        if !self.workflows.insert(type_ref.clone(), entry) && self.duplicate.is_none() {
            self.duplicate = Some(Error::DuplicateWorkflowType(type_ref.to_string()));
        }
        self
    }

    /// Register an activity handler under its `{name, version}`.
    ///
    /// Defers duplicate type checks until build time.
    pub fn register_activity<H: ActivityHandler>(mut self, handler: H) -> Self {
        let entry: Box<dyn ActivityEntry> = Box::new(handler);
        let type_ref = entry.activity_type();
        if !self.activities.insert(type_ref.clone(), entry) && self.duplicate.is_none() {
            self.duplicate = Some(Error::DuplicateActivityType(type_ref.to_string()));
        }
        self
    }

    /// Set the runtime configuration.
    ///
    /// If not called, uses [`RuntimeConfig::default()`].
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Result<WorkerRuntime<T>> {
        if let Some(err) = self.duplicate {
            return Err(err);
        }
        let identity = self
            .config
            .identity
            .clone()
            .unwrap_or_else(|| format!("swfr-{}", uuid::Uuid::new_v4()));

        Ok(WorkerRuntime {
            decider: Decider::new(self.payloads.clone(), self.config.decider.clone()),
            transport: self.transport,
            payloads: self.payloads,
            workflows: self.workflows,
            activities: self.activities,
            config: self.config,
            identity,
        })
    }
}

/// Decision and activity worker runtime.
///
/// The runtime spawns decision workers for the registered workflows and
/// activity workers for the registered activities, all sharing one
/// transport and payload store.
///
/// # Lifecycle
///
/// 1. Create with [`WorkerRuntime::builder(transport, payloads)`](WorkerRuntime::builder)
/// 2. Register with [`WorkerBuilder::register_workflow()`] and [`WorkerBuilder::register_activity()`]
/// 3. Configure with [`WorkerBuilder::config()`]
/// 4. Build with [`WorkerBuilder::build()`]
/// 5. Run with [`WorkerRuntime::run()`]
pub struct WorkerRuntime<T> {
    pub(crate) transport: Arc<T>,
    pub(crate) payloads: PayloadStore,
    decider: Decider,
    workflows: Registry<dyn WorkflowEntry>,
    pub(crate) activities: Registry<dyn ActivityEntry>,
    pub(crate) config: RuntimeConfig,
    identity: String,
}

impl<T> WorkerRuntime<T>
where
    T: DecisionTransport + ActivityTransport,
{
    /// Create a new runtime builder.
    pub fn builder(transport: Arc<T>, payloads: PayloadStore) -> WorkerBuilder<T> {
        WorkerBuilder::new(transport, payloads)
    }

    /// Returns the runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns the identity reported to the coordinator.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the number of registered workflows.
    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }

    /// Returns the number of registered activities.
    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }

    /// Run the registered workflow for `task` without responding.
    pub async fn decide(&self, task: &DecisionTask) -> Result<DecisionOutput> {
        let entry = self
            .workflows
            .get(&task.workflow_type)
            .ok_or_else(|| Error::UnknownWorkflowType(task.workflow_type.to_string()))?;
        self.decider
            .decide_with(|ctx, input| entry.run_pass(ctx, input), task)
            .await
    }

    /// Run the workers until the shutdown signal.
    ///
    /// Decision workers are spawned only when workflows are registered,
    /// activity workers only when activities are. Counts come from
    /// `decision_workers` and `activity_workers` in [`RuntimeConfig`].
    ///
    /// # Shutdown Behavior
    ///
    /// When the shutdown future completes:
    /// 1. Outstanding polls are abandoned and no new task is taken
    /// 2. Tasks already being processed run to completion and are answered
    /// 3. The runtime returns once all workers stopped, or after `shutdown_timeout`
    ///
    /// # Example
    ///
    /// ```ignore
    /// use tokio::signal;
    ///
    /// runtime.run(async { signal::ctrl_c().await.ok(); }).await?;
    /// ```
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let decision_worker_count = if self.workflows.is_empty() {
            0
        } else {
            self.config.decision_workers.max(1)
        };
        let activity_worker_count = if self.activities.is_empty() {
            0
        } else {
            self.config.activity_workers.max(1)
        };

        info!(
            identity = %self.identity,
            workflows = self.workflow_count(),
            activities = self.activity_count(),
            decision_workers = decision_worker_count,
            activity_workers = activity_worker_count,
            "Runtime starting"
        );

        let runtime = Arc::new(self);
        let mut worker_handles = Vec::new();

        for i in 0..decision_worker_count {
            let identity = worker_identity(&runtime.identity, "decider", i, decision_worker_count);
            let worker = DecisionWorker::new(Arc::clone(&runtime), identity);
            let worker_shutdown_rx = shutdown_rx.clone();
            worker_handles.push(tokio::spawn(async move {
                worker.run(worker_shutdown_rx).await;
            }));
        }

        for i in 0..activity_worker_count {
            let identity = worker_identity(&runtime.identity, "activity", i, activity_worker_count);
            let worker = ActivityWorker::new(Arc::clone(&runtime), identity);
            let worker_shutdown_rx = shutdown_rx.clone();
            worker_handles.push(tokio::spawn(async move {
                worker.run(worker_shutdown_rx).await;
            }));
        }

        // Wait for shutdown signal
        shutdown.await;

        // Signal shutdown to all workers
        let _ = shutdown_tx.send(true);

        // Wait for all workers with timeout
        let shutdown_timeout = runtime.config.shutdown_timeout;
        let all_workers = async {
            for handle in worker_handles {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(shutdown_timeout, all_workers).await {
            Ok(()) => {
                info!(identity = %runtime.identity, "Runtime stopped gracefully");
            }
            Err(_) => {
                warn!(
                    identity = %runtime.identity,
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Shutdown timeout exceeded, forcing stop"
                );
            }
        }

        Ok(())
    }
}

fn worker_identity(base: &str, role: &str, index: usize, count: usize) -> String {
    if count == 1 {
        format!("{base}-{role}")
    } else {
        format!("{base}-{role}-{index}")
    }
}
