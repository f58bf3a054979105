// crates/sqlite-worker/src/lib.rs
// ============================================================================
// Module: SQLite Worker Library
// Description: Single-writer SQLite execution engine with batched commits.
// Purpose: Serialize statement execution from many threads onto one
//          connection and deliver results through tokens.
// Dependencies: crossbeam-channel, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! SQLite Worker funnels every statement from any number of caller threads
//! through one bounded queue into one execution thread that owns the
//! connection. Results come back through opaque [`Token`]s.
//!
//! Around that core sit an explicit transaction gate, a reconnect supervisor,
//! typed statement hooks, CRUD builders guarded by identifier validation, and
//! a migration ledger.
//!
//! Invariants:
//! - No two statements ever execute concurrently on the connection.
//! - Statements execute in FIFO submission order.
//! - Statement failures are values delivered through tokens; only exhausted
//!   reconnects stop the engine.
//!
//! Security posture: statement text passed to `execute` is trusted; values are
//! always bound, and builder identifiers are validated before interpolation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod builder;
pub mod config;
pub mod error;
mod executor;
pub mod hooks;
pub mod identifier;
pub mod migration;
mod queue;
pub mod registry;
pub mod statement;
pub mod stats;
pub mod supervisor;
pub mod transaction;
pub mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use builder::SelectQuery;
pub use config::JournalMode;
pub use config::SyncMode;
pub use config::WorkerConfig;
pub use error::StatementError;
pub use error::StatementErrorKind;
pub use error::WorkerError;
pub use executor::WorkerState;
pub use hooks::HookEvent;
pub use hooks::HookId;
pub use migration::MigrationRecord;
pub use registry::StatementResult;
pub use registry::Token;
pub use rusqlite::types::Value;
pub use stats::WorkerStatsSnapshot;
pub use worker::SqliteWorker;

/// One result row: column values in select-list order.
pub type Row = Vec<Value>;
