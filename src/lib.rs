//! Attendance recording for recurring district meetings.
//!
//! The interesting parts live in [`engine`]: meeting identity resolution
//! (idempotent get-or-create with duplicate collapse), roster reconciliation
//! and the edit session with snapshot, dirty tracking and rollback.

pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod store;
