// crates/sqlite-worker/src/supervisor.rs
// ============================================================================
// Module: Reconnect Supervisor
// Description: Connection lifecycle, failure classification, and retry loops.
// Purpose: Recover from transient busy/locked failures and lost connections
//          with bounded retries.
// Dependencies: rusqlite, tracing, crate::config, crate::stats
// ============================================================================

//! ## Overview
//! Two retry scopes live here:
//! - [`retry_contended`] retries one statement in place while the engine
//!   reports busy/locked, without touching the connection.
//! - [`reconnect_with_retry`] reopens the connection after a connection-level
//!   failure, replaying initialization statements on each attempt.
//!
//! Both are bounded by the configured `max_retries` and sleep `retry_delay`
//! between attempts. Exhausting reconnects is fatal to the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use tracing::warn;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::stats::WorkerStats;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Ledger table created on every connection open.
const CREATE_LEDGER_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL
);";

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Coarse classification of a `rusqlite` failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Busy or locked; retry the statement in place.
    Contention,
    /// The physical connection is unusable; reopen it.
    Connection,
    /// The statement itself was rejected.
    Statement,
}

/// Classifies a `rusqlite` failure into a retry scope.
#[must_use]
pub fn classify_failure(error: &rusqlite::Error) -> FailureClass {
    match error.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => FailureClass::Contention,
        Some(
            ErrorCode::SystemIoFailure
            | ErrorCode::CannotOpen
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::NotADatabase
            | ErrorCode::FileLockingProtocolFailed,
        ) => FailureClass::Connection,
        Some(_) => FailureClass::Statement,
        None => classify_error_message(&error.to_string()),
    }
}

/// Classifies failures without an engine result code by their text.
fn classify_error_message(message: &str) -> FailureClass {
    let lower = message.to_ascii_lowercase();
    if lower.contains("busy") || lower.contains("locked") {
        FailureClass::Contention
    } else {
        FailureClass::Statement
    }
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Retry bound and delay shared by both retry scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
    /// Sleep between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Builds the policy from worker configuration.
    #[must_use]
    pub const fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.retry_delay(),
        }
    }
}

/// Runs `operation`, retrying in place while it fails with contention.
///
/// # Errors
///
/// Returns the last failure once retries are exhausted, or the first failure
/// that is not contention.
pub fn retry_contended<T, F>(
    policy: RetryPolicy,
    stats: &WorkerStats,
    mut operation: F,
) -> rusqlite::Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Err(err)
                if attempt < policy.max_retries
                    && classify_failure(&err) == FailureClass::Contention =>
            {
                attempt += 1;
                stats.record_contention_retry();
                warn!(attempt, max_retries = policy.max_retries, error = %err, "database busy; retrying statement");
                thread::sleep(policy.delay);
            }
            outcome => return outcome,
        }
    }
}

/// Reopens a resource up to `policy.max_retries` times.
///
/// # Errors
///
/// Returns the last open failure once attempts are exhausted. With zero
/// retries the call fails immediately.
pub fn reconnect_with_retry<T, F>(policy: RetryPolicy, mut open: F) -> Result<T, WorkerError>
where
    F: FnMut() -> Result<T, WorkerError>,
{
    let mut last_error =
        WorkerError::Connection("connection lost and reconnect is disabled".to_string());
    for attempt in 1 ..= policy.max_retries {
        thread::sleep(policy.delay);
        warn!(attempt, max_retries = policy.max_retries, "reopening sqlite connection");
        match open() {
            Ok(resource) => return Ok(resource),
            Err(err) => {
                warn!(attempt, error = %err, "sqlite reconnect attempt failed");
                last_error = err;
            }
        }
    }
    Err(last_error)
}

// ============================================================================
// SECTION: Connection Lifecycle
// ============================================================================

/// Opens the configured connection, applies pragmas, replays initialization
/// statements, and ensures the migration ledger exists.
///
/// # Errors
///
/// Returns [`WorkerError::Connection`] when the database cannot be opened or
/// configured, and [`WorkerError::Initialization`] when an init statement is
/// rejected.
pub fn open_connection(config: &WorkerConfig) -> Result<Connection, WorkerError> {
    let connection = if config.is_memory() {
        Connection::open_in_memory().map_err(|err| WorkerError::Connection(err.to_string()))?
    } else {
        ensure_parent_dir(&config.path)?;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        Connection::open_with_flags(&config.path, flags)
            .map_err(|err| WorkerError::Connection(err.to_string()))?
    };
    apply_pragmas(&connection, config)?;
    for statement in &config.init_statements {
        connection
            .execute_batch(statement)
            .map_err(|err| WorkerError::Initialization(err.to_string()))?;
    }
    connection
        .execute_batch(CREATE_LEDGER_SQL)
        .map_err(|err| WorkerError::Connection(err.to_string()))?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &WorkerConfig) -> Result<(), WorkerError> {
    connection
        .busy_timeout(config.busy_timeout())
        .map_err(|err| WorkerError::Connection(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| WorkerError::Connection(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| WorkerError::Connection(err.to_string()))?;
    Ok(())
}

/// Ensures the parent directory for the database exists.
fn ensure_parent_dir(path: &Path) -> Result<(), WorkerError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|err| WorkerError::Connection(err.to_string())),
        _ => Ok(()),
    }
}
