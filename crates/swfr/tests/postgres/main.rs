//! PostgreSQL payload persister tests.
//!
//! Requires `TEST_ADMIN_DATABASE_URL`; run with `--features postgres`.

#[path = "../support/mod.rs"]
mod support;
