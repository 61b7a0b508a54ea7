//! Error types for swfr.
//!
//! Two layers of errors exist:
//!
//! - [`enum@Error`] covers the infrastructure: transports, payload persisters,
//!   history decoding and registration.
//! - [`WorkflowError`] is what a workflow program sees and returns. It is
//!   converted into a `FailWorkflowExecution` decision by the decider, except
//!   for [`WorkflowError::Suspended`], which only ends the current pass.

use std::error::Error as StdError;

use serde_json::Value;
use thiserror::Error;

use crate::activity_table::ActivityFailure;

/// A `Result` alias with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A `Result` alias for workflow programs.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Errors that can occur in swfr operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to serialize or deserialize JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// PostgreSQL payload storage error.
    ///
    /// Preserves the full `sqlx::Error` for matching on specific database
    /// error conditions (connection timeout, constraint violation, etc.).
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// The coordinator transport reported an error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A payload exceeded the external size limit and cannot be stored.
    #[error("payload for task {key} is too large ({size} bytes, limit {limit})")]
    PayloadTooLarge {
        /// Storage key the payload was saved under.
        key: String,
        /// Serialized size in bytes.
        size: usize,
        /// The configured external limit.
        limit: usize,
    },

    /// A payload needed externalizing but no external persister is configured.
    #[error("payload exceeds the inline limit and no external persister is configured")]
    NoExternalPersister,

    /// A payload reference carried a malformed URI.
    #[error("invalid payload uri: {0}")]
    InvalidPayloadUri(#[from] url::ParseError),

    /// A payload reference pointed at nothing.
    #[error("payload not found: {0}")]
    PayloadNotFound(String),

    /// A decision task history could not be interpreted.
    #[error("invalid history: {0}")]
    InvalidHistory(String),

    /// Workflow type was not registered with the runtime.
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    /// Workflow type was registered more than once.
    #[error("duplicate workflow type registration: {0}")]
    DuplicateWorkflowType(String),

    /// Activity type was registered more than once.
    #[error("duplicate activity type registration: {0}")]
    DuplicateActivityType(String),
}

impl Error {
    /// Wrap a transport-level failure.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Errors raised inside a workflow program.
///
/// Workflow code propagates these with `?`. Every variant except
/// [`Suspended`](Self::Suspended) fails the workflow execution.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A call is still waiting on an activity; the pass ends here.
    ///
    /// This is not a failure. The decisions accumulated so far are sent
    /// and the program is replayed when the next decision task arrives.
    #[error("workflow suspended awaiting activity results")]
    Suspended,

    /// An activity failed or timed out and exhausted its retries.
    #[error(transparent)]
    Activity(#[from] ActivityFailure),

    /// The program asked for a call that disagrees with recorded history.
    #[error("nondeterministic workflow: {0}")]
    Nondeterminism(String),

    /// The program failed on its own terms.
    #[error("{reason}")]
    Failed {
        /// Short human-readable reason.
        reason: String,
        /// Optional structured payload attached to the failure.
        details: Option<Value>,
    },

    /// Input or result data did not have the expected shape.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Fail the workflow with a reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        WorkflowError::Failed {
            reason: reason.into(),
            details: None,
        }
    }

    /// Fail the workflow with a reason and a structured payload.
    pub fn fail_with(reason: impl Into<String>, details: Value) -> Self {
        WorkflowError::Failed {
            reason: reason.into(),
            details: Some(details),
        }
    }

    /// Returns `true` if this is a suspension rather than a failure.
    pub fn is_suspended(&self) -> bool {
        matches!(self, WorkflowError::Suspended)
    }

    /// Structured payload reported alongside the failure reason.
    pub(crate) fn payload(&self) -> Value {
        match self {
            WorkflowError::Failed { details, .. } => details.clone().unwrap_or(Value::Null),
            WorkflowError::Activity(failure) => Value::Object(failure.details.clone()),
            _ => Value::Null,
        }
    }
}

/// Render an error and its sources, one per line.
pub(crate) fn error_chain(err: &dyn StdError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str("\ncaused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
