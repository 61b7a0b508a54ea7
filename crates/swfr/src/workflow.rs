//! Workflow programs and the identifiers shared with the coordinator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::DecisionContext;
use crate::error::WorkflowResult;

/// A `{name, version}` pair identifying a workflow or activity type.
///
/// # Example
///
/// ```
/// use swfr::TypeRef;
///
/// let noop = TypeRef::new("noop", "1.0");
/// assert_eq!(noop.to_string(), "noop@1.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Registered type name.
    pub name: String,
    /// Registered type version.
    pub version: String,
}

impl TypeRef {
    /// Create a new type reference.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A named task list, as the coordinator spells it on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub name: String,
}

impl TaskList {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Identity of one workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    /// The caller-chosen workflow id (business key).
    pub workflow_id: String,
    /// The coordinator-assigned run id.
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl std::fmt::Display for WorkflowExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.workflow_id, self.run_id)
    }
}

/// A type registered with the coordinator under a name and version.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Versioned)]
/// #[versioned(name = "reproject", version = "2.1")]
/// struct Reproject;
/// ```
pub trait Versioned {
    /// Registered type name.
    const NAME: &'static str;
    /// Registered type version.
    const VERSION: &'static str;

    /// The `{name, version}` pair as a [`TypeRef`].
    fn type_ref() -> TypeRef
    where
        Self: Sized,
    {
        TypeRef::new(Self::NAME, Self::VERSION)
    }
}

/// A deterministic workflow program.
///
/// `run` is called once per decision task with the execution's start input
/// and a fresh [`DecisionContext`] rebuilt from history. The program must
/// make the same calls in the same order on every pass: all durable state
/// lives in the history, never in `self`.
///
/// Returning `Err(WorkflowError::Suspended)` (normally via `?` on a pending
/// call) ends the pass without failing the workflow. Any other error fails
/// the execution.
///
/// # Example
///
/// ```ignore
/// #[derive(Versioned)]
/// #[versioned(name = "double", version = "1.0")]
/// struct Double;
///
/// impl Workflow for Double {
///     fn run(&self, ctx: &mut DecisionContext, input: Value) -> WorkflowResult<()> {
///         let n: i64 = ctx.activity("noop", "1.0").call(input)?;
///         ctx.complete(n * 2)
///     }
/// }
/// ```
pub trait Workflow: Versioned + Send + Sync + 'static {
    /// Run one decision pass.
    fn run(&self, ctx: &mut DecisionContext, input: Value) -> WorkflowResult<()>;
}
