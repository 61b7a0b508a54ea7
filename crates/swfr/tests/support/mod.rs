//! Helpers shared by the integration test binaries.
//!
//! Each binary pulls this in with `#[path = "../support/mod.rs"] mod support;`
//! and uses only part of it.

#![allow(dead_code)]

pub mod execution;
pub mod logs;

use std::time::Duration;

pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("swfr=debug")
        .with_test_writer()
        .try_init();
}
