// crates/sqlite-worker/src/error.rs
// ============================================================================
// Module: SQLite Worker Errors
// Description: Error taxonomy for the single-writer execution engine.
// Purpose: Separate synchronous misuse errors from asynchronous statement outcomes.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Two error families live here:
//! - [`WorkerError`] is returned synchronously to the calling thread for
//!   validation failures, queue backpressure, transaction misuse, and fatal
//!   connection loss.
//! - [`StatementError`] is a value delivered through the token channel when
//!   the storage engine rejects a statement. The execution thread never aborts
//!   because of it.
//!
//! Invariants:
//! - Error messages never embed bound parameter values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::registry::Token;

// ============================================================================
// SECTION: Statement Errors
// ============================================================================

/// Coarse classification for statement failures delivered through tokens.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementErrorKind {
    /// The storage engine rejected the statement (syntax, missing table, misuse).
    Rejected,
    /// A uniqueness, NOT NULL, CHECK, or foreign key constraint failed.
    Constraint,
    /// The database stayed busy or locked after every retry was spent.
    Contention,
    /// The request never executed because the engine stopped first.
    Aborted,
}

impl StatementErrorKind {
    /// Returns a stable label for logs and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::Constraint => "constraint",
            Self::Contention => "contention",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for StatementErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement failure captured by the execution loop and returned by `fetch`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("statement {kind}: {message}")]
pub struct StatementError {
    /// Failure classification.
    pub kind: StatementErrorKind,
    /// Engine-provided failure description.
    pub message: String,
}

impl StatementError {
    /// Creates a statement error with the given kind.
    #[must_use]
    pub fn new(kind: StatementErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Builds a statement error from a `rusqlite` failure.
    ///
    /// Constraint violations keep their own kind; busy/locked failures are
    /// reported as [`StatementErrorKind::Contention`].
    #[must_use]
    pub fn from_sqlite(error: &rusqlite::Error) -> Self {
        let kind = match error.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StatementErrorKind::Constraint,
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                StatementErrorKind::Contention
            }
            _ => StatementErrorKind::Rejected,
        };
        Self::new(kind, error.to_string())
    }

    /// Builds the error delivered to requests that were never executed.
    #[must_use]
    pub fn aborted(reason: &str) -> Self {
        Self::new(StatementErrorKind::Aborted, reason)
    }
}

// ============================================================================
// SECTION: Worker Errors
// ============================================================================

/// Errors raised synchronously by the worker API.
///
/// # Invariants
/// - Validation variants are produced before any request is queued.
/// - [`WorkerError::Connection`] after startup means the engine is stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// A table or column name failed identifier validation.
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),
    /// A builder argument was malformed (empty map, bad limit, bad ordering).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Worker configuration is out of range.
    #[error("invalid worker config: {0}")]
    InvalidConfig(String),
    /// The request queue stayed full for the whole submission deadline.
    #[error("request queue full (capacity {capacity}) after waiting {waited_ms} ms")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
        /// Submission deadline that elapsed, in milliseconds.
        waited_ms: u64,
    },
    /// The engine is shutting down or has stopped.
    #[error("sqlite worker is closed")]
    EngineClosed,
    /// `begin` was called while a transaction is already open.
    #[error("a transaction is already open")]
    TransactionAlreadyOpen,
    /// `commit` or `rollback` was called without an open transaction.
    #[error("no transaction is open")]
    NoTransactionOpen,
    /// The storage connection could not be opened or was lost for good.
    #[error("sqlite connection error: {0}")]
    Connection(String),
    /// An initialization statement was rejected while opening the connection.
    #[error("initialization statement failed: {0}")]
    Initialization(String),
    /// A statement executed on behalf of a synchronous helper failed.
    #[error(transparent)]
    Statement(#[from] StatementError),
    /// `fetch_timeout` gave up before the result was published.
    #[error("timed out waiting for result of token {0}")]
    FetchTimeout(Token),
    /// Thread lifecycle failure.
    #[error("sqlite worker io error: {0}")]
    Io(String),
}
