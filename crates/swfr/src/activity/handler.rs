//! Activity handler trait for executing scheduled work.

use async_trait::async_trait;
use serde_json::Value;

use super::context::ActivityContext;
use crate::workflow::{TypeRef, Versioned};

/// Handler for one activity type.
///
/// The handler's [`Versioned`] name and version are the activity type it
/// serves. It receives the positional arguments the workflow passed to the
/// call and returns the JSON result the workflow will see.
///
/// # Results
///
/// | Result | Meaning |
/// |--------|---------|
/// | `Ok(value)` | Activity completed; `value` is the workflow-visible result |
/// | `Err(_)` | Activity failed; the workflow retries or sees the failure |
///
/// The error's `Display` becomes the failure reason. Its alternate form
/// (`{:#}`) is sent as the stack, so `anyhow::Error` reports its whole
/// chain.
///
/// # Idempotency
///
/// A call may run more than once (timeouts, retries, worker crashes).
/// Use [`ActivityContext::idempotency_key()`] when calling external APIs
/// that support idempotency keys.
///
/// # Example
///
/// ```ignore
/// #[derive(Versioned)]
/// #[versioned(name = "noop", version = "1.0")]
/// struct Noop;
///
/// #[async_trait]
/// impl ActivityHandler for Noop {
///     type Error = anyhow::Error;
///
///     async fn handle(&self, args: Vec<Value>, _ctx: &ActivityContext) -> Result<Value, Self::Error> {
///         Ok(args.into_iter().next().unwrap_or(Value::Null))
///     }
/// }
/// ```
#[async_trait]
pub trait ActivityHandler: Versioned + Send + Sync + 'static {
    /// The error type returned by this handler.
    type Error: std::fmt::Display + Send + 'static;

    /// Run the activity.
    async fn handle(&self, args: Vec<Value>, ctx: &ActivityContext) -> Result<Value, Self::Error>;
}

/// A handler error rendered for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HandlerFailure {
    pub reason: String,
    pub stack: String,
}

/// Type-erased activity handler for dynamic dispatch.
#[async_trait]
pub(crate) trait ActivityEntry: Send + Sync {
    fn activity_type(&self) -> TypeRef;

    async fn run(&self, args: Vec<Value>, ctx: &ActivityContext) -> Result<Value, HandlerFailure>;
}

#[async_trait]
impl<H: ActivityHandler> ActivityEntry for H {
    fn activity_type(&self) -> TypeRef {
        H::type_ref()
    }

    async fn run(&self, args: Vec<Value>, ctx: &ActivityContext) -> Result<Value, HandlerFailure> {
        self.handle(args, ctx).await.map_err(|e| HandlerFailure {
            reason: e.to_string(),
            stack: format!("{e:#}"),
        })
    }
}
