//! Activity handlers and their execution context.
//!
//! - [`ActivityHandler`]: user code behind one `{name, version}` activity type
//! - [`ActivityContext`]: task metadata passed to every invocation

mod context;
mod handler;

pub use context::ActivityContext;
pub use handler::ActivityHandler;
pub(crate) use handler::{ActivityEntry, HandlerFailure};
