// crates/sqlite-worker-config/src/lib.rs
// ============================================================================
// Module: SQLite Worker Config Library
// Description: TOML loading and validation for the SQLite worker engine.
// Purpose: Turn an untrusted config file into a validated `WorkerConfig`.
// Dependencies: serde, sqlite-worker, thiserror, toml
// ============================================================================

//! ## Overview
//! `sqlite-worker-config` reads a TOML document with a single `[worker]`
//! table and produces a validated [`sqlite_worker::WorkerConfig`]. Loading is
//! strict and fail-closed: oversized files, non-UTF-8 content, unknown keys,
//! and out-of-range values are all rejected.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod example;
pub mod load;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use example::config_toml_example;
pub use load::ConfigError;
pub use load::load;
pub use load::parse;
