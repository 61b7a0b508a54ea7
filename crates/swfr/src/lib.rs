//! Deterministic replay deciders for long-poll workflow coordinators.
//!
//! swfr runs workflow programs against a coordinator that keeps each
//! execution's event history (Amazon SWF and compatible services):
//!
//! - **Replay**: every decision task re-runs the program from the start
//!   against the history; calls already answered resolve immediately
//! - **Content-addressed calls**: an activity call is identified by the
//!   SHA-512 of its type and arguments, so replays find their own records
//! - **Suspension**: the first call without an answer ends the pass with
//!   the decisions gathered so far
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Decider                                    │
//! │                                                                         │
//! │   1. Parse history → ActivityTable                                      │
//! │   2. Load externalized results                                          │
//! │   3. Workflow::run(ctx, input) until done or suspended                  │
//! │   4. Failure → FailWorkflowExecution                                    │
//! │   5. Externalize oversized inputs                                       │
//! │   6. Return decisions                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use swfr::{DecisionContext, PayloadStore, Versioned, Workflow, WorkflowResult, WorkerRuntime};
//!
//! #[derive(Versioned)]
//! #[versioned(name = "double", version = "1.0")]
//! struct Double;
//!
//! impl Workflow for Double {
//!     fn run(&self, ctx: &mut DecisionContext, input: Value) -> WorkflowResult<()> {
//!         let n: i64 = ctx.activity("noop", "1.0").call(input)?;
//!         ctx.complete(n * 2)
//!     }
//! }
//!
//! let runtime = WorkerRuntime::builder(transport, PayloadStore::in_memory())
//!     .register_workflow(Double)
//!     .register_activity(Noop)
//!     .build()?;
//! runtime.run(shutdown_signal).await?;
//! ```
//!
//! # Feature Flags
//!
//! - `postgres`: Enables [`PgPersister`] for storing large payloads in PostgreSQL
//!
//! # Design Documentation
//!
//! See `DESIGN.md` for the decisions behind replay and payload handling.

// Allow the crate to reference itself as `swfr` for macro-generated code
extern crate self as swfr;

pub mod activity;
mod activity_table;
mod call_key;
mod context;
mod decider;
mod decision;
mod error;
pub mod history;
pub mod payload;
pub mod runtime;
mod transport;
mod workflow;

pub use activity::{ActivityContext, ActivityHandler};
pub use activity_table::{
    ActivityFailure, ActivityRecord, ActivityStatus, ActivityTable, FailureKind,
};
pub use call_key::CallKey;
pub use context::{ActivityCall, CallOptions, CallOutcome, DecisionContext};
pub use decider::{Decider, DecisionOutput};
pub use decision::{ActivityInput, Decision, MAX_DETAILS_LEN, MAX_REASON_LEN};
pub use error::{Error, Result, WorkflowError, WorkflowResult};
pub use history::{EventKind, HistoryEvent};
#[cfg(feature = "postgres")]
pub use payload::PgPersister;
pub use payload::{MemoryPersister, PayloadLimits, PayloadPersister, PayloadStore};
pub use runtime::{DeciderConfig, RuntimeConfig, WorkerBuilder, WorkerRuntime};
pub use transport::{ActivityTask, ActivityTransport, DecisionTask, DecisionTransport};
pub use workflow::{TaskList, TypeRef, Versioned, Workflow, WorkflowExecution};

// Re-export derive macros
pub use swfr_macros::Versioned;
