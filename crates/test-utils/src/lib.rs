//! Shared helpers for swfr's database-backed tests.

pub mod db;
