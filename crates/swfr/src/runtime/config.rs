//! Runtime configuration.

use std::time::Duration;

/// Hard cap on [`DeciderConfig::max_concurrency`] and on per-call fan-out.
pub const MAX_CONCURRENCY: usize = 1000;

/// Task list used when none is configured.
pub const DEFAULT_TASK_LIST: &str = "defaultTaskList";

/// Defaults applied to workflow calls during a decision pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeciderConfig {
    /// Attempts allowed per activity call when the call sets none.
    ///
    /// Default: 1 (no retry).
    pub default_retries: u32,

    /// Task list new activities are scheduled on when the call sets none.
    ///
    /// Default: `"defaultTaskList"`.
    pub default_task_list: String,

    /// Fan-out concurrency used by [`DecisionContext::map`](crate::DecisionContext::map)
    /// when the caller passes `0`, and the ceiling on calls in flight in one
    /// pass: once that many are scheduled or running, further new calls are
    /// left pending without a schedule decision.
    ///
    /// Clamped to [`MAX_CONCURRENCY`]. Default: 1000.
    pub max_concurrency: usize,
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self {
            default_retries: 1,
            default_task_list: DEFAULT_TASK_LIST.to_owned(),
            max_concurrency: MAX_CONCURRENCY,
        }
    }
}

/// Configuration for the worker runtime.
///
/// Controls task lists, worker concurrency, heartbeats and shutdown.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use swfr::runtime::RuntimeConfig;
///
/// let config = RuntimeConfig {
///     activity_task_list: "gdal".into(),
///     activity_workers: 4,  // Run up to 4 activities in parallel
///     heartbeat_interval: Duration::from_secs(10),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Task list decision workers poll.
    ///
    /// Default: `"defaultTaskList"`.
    pub decision_task_list: String,

    /// Task list activity workers poll.
    ///
    /// Default: `"defaultTaskList"`.
    pub activity_task_list: String,

    /// Identity reported to the coordinator on every poll.
    ///
    /// If `None`, `swfr-<uuid>` is generated at build time. Workers append
    /// their role and index.
    pub identity: Option<String>,

    /// Number of decision workers to spawn.
    ///
    /// Each worker holds at most one decision task at a time. Default: 1.
    pub decision_workers: usize,

    /// Number of activity workers to spawn.
    ///
    /// Each worker runs one activity at a time. Increase this when
    /// activities are slow or I/O bound. Default: 1.
    pub activity_workers: usize,

    /// How often a running activity reports liveness.
    ///
    /// Keep well under the activity type's heartbeat timeout.
    /// Default: 30 seconds.
    pub heartbeat_interval: Duration,

    /// Maximum time to wait for in-flight tasks during shutdown.
    ///
    /// After this timeout, the runtime will force stop.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,

    /// First delay after a failed poll.
    ///
    /// The delay doubles with each consecutive failure. Default: 200ms.
    pub poll_error_backoff_base: Duration,

    /// Cap on the delay after failed polls.
    ///
    /// Default: 5 seconds.
    pub poll_error_backoff_max: Duration,

    /// Defaults for workflow calls.
    pub decider: DeciderConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            decision_task_list: DEFAULT_TASK_LIST.to_owned(),
            activity_task_list: DEFAULT_TASK_LIST.to_owned(),
            identity: None,
            decision_workers: 1,
            activity_workers: 1,
            heartbeat_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            poll_error_backoff_base: Duration::from_millis(200),
            poll_error_backoff_max: Duration::from_secs(5),
            decider: DeciderConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Delay before polling again after `failures` consecutive poll errors.
    ///
    /// `min(base * 2^(failures-1), max)`.
    pub fn poll_backoff(&self, failures: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(failures.saturating_sub(1));
        self.poll_error_backoff_base
            .saturating_mul(multiplier)
            .min(self.poll_error_backoff_max)
    }
}
