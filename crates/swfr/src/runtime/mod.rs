//! Runtime for polling and answering coordinator tasks.
//!
//! This module provides the infrastructure for running workflows and
//! activities against a coordinator:
//!
//! - [`WorkerRuntime`]: Main coordinator that runs decision and activity workers
//! - [`WorkerBuilder`]: Builder for registering workflows and activities
//! - [`RuntimeConfig`]: Task lists, worker counts, heartbeats, backoff
//! - [`DeciderConfig`]: Defaults applied to workflow calls
//!
//! # Example
//!
//! ```ignore
//! use swfr::runtime::{RuntimeConfig, WorkerRuntime};
//!
//! let runtime = WorkerRuntime::builder(transport, PayloadStore::in_memory())
//!     .register_workflow(TileWorkflow)
//!     .register_activity(Reproject)
//!     .config(RuntimeConfig::default())
//!     .build()?;
//!
//! runtime.run(shutdown_signal).await?;
//! ```

mod activity_worker;
mod config;
mod decision_worker;
pub(crate) mod registry;

use std::time::Duration;

use tokio::sync::watch;

pub use config::{DEFAULT_TASK_LIST, DeciderConfig, MAX_CONCURRENCY, RuntimeConfig};
pub use registry::{WorkerBuilder, WorkerRuntime};

/// Sleep for `delay` unless shutdown is signalled first.
///
/// Returns `true` if the worker should stop.
pub(super) async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Whether a `changed()` result means the worker should stop.
pub(super) fn stop_requested(
    changed: Result<(), watch::error::RecvError>,
    shutdown: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || *shutdown.borrow()
}
