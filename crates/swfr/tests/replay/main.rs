//! Decision passes replayed against simulated coordinator histories.

#[path = "../support/mod.rs"]
mod support;

mod scheduling;
