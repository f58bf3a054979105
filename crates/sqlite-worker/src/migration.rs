// crates/sqlite-worker/src/migration.rs
// ============================================================================
// Module: Migration Ledger
// Description: Versioned schema changes recorded in `schema_migrations`.
// Purpose: Make schema changes idempotent using only the worker's public
//          execution primitives.
// Dependencies: rusqlite, serde, tracing, crate::worker
// ============================================================================

//! ## Overview
//! A migration is a version string, a name, and statement text. Applying one
//! runs every statement plus the ledger insert inside one explicit
//! transaction; any failure rolls the whole batch back. Re-applying a recorded
//! version is a no-op that reports `false`.
//!
//! Statement text is split by a small tokenizer: `;` inside quoted strings,
//! quoted identifiers, and comments does not end a statement, and trigger
//! bodies end only at the `;` after their closing `END`.
//!
//! Invariants:
//! - Ledger operations on one worker are serialized.
//! - Version uniqueness is enforced by the ledger table's `UNIQUE` constraint.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::types::Value;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::StatementError;
use crate::error::StatementErrorKind;
use crate::error::WorkerError;
use crate::worker::SqliteWorker;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One applied migration as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    /// Unique migration version.
    pub version: String,
    /// Human-readable migration name.
    pub name: String,
    /// Application time in unix epoch milliseconds.
    pub applied_at: i64,
}

/// Serializes ledger operations for one worker.
#[derive(Debug, Default)]
pub struct MigrationLedger {
    /// Held for the duration of each ledger operation.
    serial: Mutex<()>,
}

impl MigrationLedger {
    /// Creates a ledger handle.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            serial: Mutex::new(()),
        }
    }

    /// Applies a migration unless its version is already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidArgument`] for an empty version or name,
    /// the statement failure that aborted the migration, or any transaction
    /// error.
    pub fn apply(
        &self,
        worker: &SqliteWorker,
        version: &str,
        name: &str,
        sql: &str,
    ) -> Result<bool, WorkerError> {
        if version.trim().is_empty() || name.trim().is_empty() {
            return Err(WorkerError::InvalidArgument(
                "migration version and name must not be empty".to_string(),
            ));
        }
        let _serial = self.serial.lock().unwrap_or_else(PoisonError::into_inner);
        let statements = split_statements(sql);
        worker.begin()?;
        let outcome = apply_in_transaction(worker, version, name, &statements);
        let applied = matches!(outcome, Ok(true));
        finish(worker, version, outcome)?;
        if applied {
            info!(version, name, statements = statements.len(), "migration applied");
        }
        Ok(applied)
    }

    /// Reverts a recorded migration by running `sql` and deleting its row.
    ///
    /// Returns `false` when the version is not recorded.
    ///
    /// # Errors
    ///
    /// Returns the statement failure that aborted the rollback, or any
    /// transaction error.
    pub fn rollback(
        &self,
        worker: &SqliteWorker,
        version: &str,
        sql: &str,
    ) -> Result<bool, WorkerError> {
        let _serial = self.serial.lock().unwrap_or_else(PoisonError::into_inner);
        let statements = split_statements(sql);
        worker.begin()?;
        let outcome = rollback_in_transaction(worker, version, &statements);
        let reverted = matches!(outcome, Ok(true));
        finish(worker, version, outcome)?;
        if reverted {
            info!(version, "migration rolled back");
        }
        Ok(reverted)
    }

    /// Lists recorded migrations in application order.
    ///
    /// # Errors
    ///
    /// Returns the statement failure when the ledger cannot be read.
    pub fn list(worker: &SqliteWorker) -> Result<Vec<MigrationRecord>, WorkerError> {
        let rows = worker.query_rows(
            "SELECT version, name, applied_at FROM schema_migrations ORDER BY id",
            &[],
        )?;
        rows.into_iter()
            .map(|row| match row.as_slice() {
                [Value::Text(version), Value::Text(name), Value::Integer(applied_at)] => {
                    Ok(MigrationRecord {
                        version: version.clone(),
                        name: name.clone(),
                        applied_at: *applied_at,
                    })
                }
                _ => Err(WorkerError::Statement(StatementError::new(
                    StatementErrorKind::Rejected,
                    "malformed schema_migrations row",
                ))),
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Ledger Steps
// ============================================================================

/// Runs the migration body; `Ok(false)` means the version already exists.
fn apply_in_transaction(
    worker: &SqliteWorker,
    version: &str,
    name: &str,
    statements: &[String],
) -> Result<bool, WorkerError> {
    if is_recorded(worker, version)? {
        return Ok(false);
    }
    for statement in statements {
        worker.query_rows(statement, &[])?;
    }
    let inserted = worker.query_rows(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        &[
            Value::Text(version.to_string()),
            Value::Text(name.to_string()),
            Value::Integer(unix_millis()),
        ],
    );
    match inserted {
        Ok(_) => Ok(true),
        Err(WorkerError::Statement(err)) if err.kind == StatementErrorKind::Constraint => Ok(false),
        Err(err) => Err(err),
    }
}

/// Runs the revert body; `Ok(false)` means the version is not recorded.
fn rollback_in_transaction(
    worker: &SqliteWorker,
    version: &str,
    statements: &[String],
) -> Result<bool, WorkerError> {
    if !is_recorded(worker, version)? {
        return Ok(false);
    }
    for statement in statements {
        worker.query_rows(statement, &[])?;
    }
    worker.query_rows(
        "DELETE FROM schema_migrations WHERE version = ?",
        &[Value::Text(version.to_string())],
    )?;
    Ok(true)
}

/// Commits when the body changed the ledger, otherwise rolls back.
fn finish(
    worker: &SqliteWorker,
    version: &str,
    outcome: Result<bool, WorkerError>,
) -> Result<(), WorkerError> {
    match outcome {
        Ok(true) => worker.commit().inspect_err(|_| rollback_quietly(worker, version)),
        Ok(false) => worker.rollback(),
        Err(err) => {
            rollback_quietly(worker, version);
            Err(err)
        }
    }
}

/// Rolls back after a failure, logging a rollback error instead of masking
/// the original one.
fn rollback_quietly(worker: &SqliteWorker, version: &str) {
    if let Err(err) = worker.rollback() {
        warn!(version, error = %err, "migration rollback failed");
    }
}

/// Returns `true` when `version` has a ledger row.
fn is_recorded(worker: &SqliteWorker, version: &str) -> Result<bool, WorkerError> {
    let rows = worker.query_rows(
        "SELECT 1 FROM schema_migrations WHERE version = ?",
        &[Value::Text(version.to_string())],
    )?;
    Ok(!rows.is_empty())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Statement Splitting
// ============================================================================

/// Lexical context of the splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    /// Ordinary statement text.
    Code,
    /// Inside `'...'`.
    SingleQuoted,
    /// Inside `"..."`.
    DoubleQuoted,
    /// Inside `` `...` ``.
    Backticked,
    /// Inside `[...]`.
    Bracketed,
    /// Inside `-- ...` up to end of line.
    LineComment,
    /// Inside `/* ... */`.
    BlockComment,
}

/// Incremental state for one statement being collected.
#[derive(Debug, Default)]
struct StatementScan {
    /// Statement text collected so far.
    text: String,
    /// Whether any code outside comments and whitespace was seen.
    has_code: bool,
    /// Word currently being read.
    word: String,
    /// First keywords of the statement, upper-cased.
    leading: Vec<String>,
    /// Statement is `CREATE [TEMP|TEMPORARY] TRIGGER`.
    trigger: bool,
    /// Open `CASE` expressions inside a trigger body.
    case_depth: usize,
    /// The trigger's closing `END` was the last keyword read.
    trigger_closed: bool,
}

impl StatementScan {
    /// Completes the current word and updates trigger tracking.
    fn finish_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let upper = self.word.to_ascii_uppercase();
        self.word.clear();
        if self.leading.len() < 3 {
            self.leading.push(upper.clone());
            self.trigger = is_trigger_prefix(&self.leading);
        }
        if !self.trigger {
            return;
        }
        match upper.as_str() {
            "CASE" => {
                self.case_depth += 1;
                self.trigger_closed = false;
            }
            "END" if self.case_depth > 0 => {
                self.case_depth -= 1;
                self.trigger_closed = false;
            }
            "END" => self.trigger_closed = true,
            _ => self.trigger_closed = false,
        }
    }

    /// Returns `true` when a `;` at this point ends the statement.
    const fn terminates_here(&self) -> bool {
        !self.trigger || self.trigger_closed
    }

    /// Moves the collected statement into `out` when it holds code.
    fn flush_into(&mut self, out: &mut Vec<String>) {
        self.finish_word();
        let scan = std::mem::take(self);
        if scan.has_code {
            out.push(scan.text.trim().to_string());
        }
    }
}

/// Returns `true` for `CREATE TRIGGER` and `CREATE TEMP[ORARY] TRIGGER`.
fn is_trigger_prefix(leading: &[String]) -> bool {
    match leading {
        [create, trigger, ..] if create == "CREATE" && trigger == "TRIGGER" => true,
        [create, temp, trigger]
            if create == "CREATE"
                && (temp == "TEMP" || temp == "TEMPORARY")
                && trigger == "TRIGGER" =>
        {
            true
        }
        _ => false,
    }
}

/// Splits migration text into individual statements.
///
/// Statement separators inside quotes or comments are kept as text, and
/// fragments holding only whitespace or comments are dropped. Returned
/// statements carry no trailing `;`.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut scan = StatementScan::default();
    let mut lexeme = Lexeme::Code;
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        match lexeme {
            Lexeme::Code => {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    scan.word.push(ch);
                    scan.text.push(ch);
                    scan.has_code = true;
                    continue;
                }
                scan.finish_word();
                match ch {
                    ';' if scan.terminates_here() => {
                        scan.flush_into(&mut statements);
                        continue;
                    }
                    '\'' => lexeme = Lexeme::SingleQuoted,
                    '"' => lexeme = Lexeme::DoubleQuoted,
                    '`' => lexeme = Lexeme::Backticked,
                    '[' => lexeme = Lexeme::Bracketed,
                    '-' if chars.peek() == Some(&'-') => {
                        lexeme = Lexeme::LineComment;
                        scan.text.push(ch);
                        scan.text.extend(chars.next());
                        continue;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        lexeme = Lexeme::BlockComment;
                        scan.text.push(ch);
                        scan.text.extend(chars.next());
                        continue;
                    }
                    _ => {}
                }
                if !ch.is_whitespace() {
                    scan.has_code = true;
                }
                scan.text.push(ch);
            }
            Lexeme::SingleQuoted | Lexeme::DoubleQuoted | Lexeme::Backticked | Lexeme::Bracketed => {
                scan.text.push(ch);
                let closing = match lexeme {
                    Lexeme::SingleQuoted => '\'',
                    Lexeme::DoubleQuoted => '"',
                    Lexeme::Backticked => '`',
                    _ => ']',
                };
                if ch == closing {
                    lexeme = Lexeme::Code;
                }
            }
            Lexeme::LineComment => {
                scan.text.push(ch);
                if ch == '\n' {
                    lexeme = Lexeme::Code;
                }
            }
            Lexeme::BlockComment => {
                scan.text.push(ch);
                if ch == '*' && chars.peek() == Some(&'/') {
                    scan.text.extend(chars.next());
                    lexeme = Lexeme::Code;
                }
            }
        }
    }
    scan.flush_into(&mut statements);
    statements
}
