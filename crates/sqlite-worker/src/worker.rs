// crates/sqlite-worker/src/worker.rs
// ============================================================================
// Module: SQLite Worker Handle
// Description: Public handle composing queue, executor, registry, and hooks.
// Purpose: Give any number of threads safe access to one SQLite connection.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! [`SqliteWorker::open`] starts the execution thread and returns only once it
//! is running. Callers submit statements from any thread; read queries always
//! receive a [`Token`], write statements receive one only when the caller asks
//! for the result. [`SqliteWorker::close`] (or dropping the handle) drains the
//! queue, commits, and joins the thread.
//!
//! Invariants:
//! - No statement executes concurrently with another.
//! - Statements execute in submission order.
//! - Hook callbacks must not call [`SqliteWorker::fetch`], [`SqliteWorker::close`],
//!   or any blocking helper on the same worker; they run on the execution
//!   thread that would have to answer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use rusqlite::types::Value;
use tracing::warn;

use crate::Row;
use crate::builder::SelectQuery;
use crate::builder::build_delete;
use crate::builder::build_insert;
use crate::builder::build_update;
use crate::config::WorkerConfig;
use crate::error::StatementError;
use crate::error::WorkerError;
use crate::executor;
use crate::executor::EngineCore;
use crate::executor::WorkerState;
use crate::hooks::HookEvent;
use crate::hooks::HookId;
use crate::migration::MigrationLedger;
use crate::migration::MigrationRecord;
use crate::queue::Request;
use crate::queue::RequestQueue;
use crate::registry::FetchOutcome;
use crate::registry::StatementResult;
use crate::registry::Token;
use crate::statement::StatementKind;
use crate::stats::WorkerStatsSnapshot;
use crate::transaction::RollbackGuard;
use crate::transaction::TransactionController;

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Handle to a single-writer `SQLite` execution engine.
///
/// # Invariants
/// - Exactly one execution thread owns the connection for the handle's life.
/// - `close` is idempotent; concurrent callers wait for the same shutdown.
pub struct SqliteWorker {
    /// State shared with the execution thread.
    core: Arc<EngineCore>,
    /// Configuration the worker was opened with.
    config: WorkerConfig,
    /// Execution thread handle; `None` after close.
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Explicit transaction gate.
    transactions: TransactionController,
    /// Migration serialization.
    migrations: MigrationLedger,
}

impl SqliteWorker {
    /// Validates `config`, opens the connection, and starts the execution
    /// thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidConfig`], [`WorkerError::Connection`],
    /// [`WorkerError::Initialization`], or [`WorkerError::Io`] when the engine
    /// cannot reach the running state.
    pub fn open(config: WorkerConfig) -> Result<Self, WorkerError> {
        config.validate()?;
        let (queue, receiver) = RequestQueue::new(config.queue_capacity, config.submit_timeout());
        let core = Arc::new(EngineCore::new(queue));
        let handle = executor::spawn(Arc::clone(&core), receiver, config.clone())?;
        Ok(Self {
            core,
            config,
            handle: Mutex::new(Some(handle)),
            transactions: TransactionController::new(),
            migrations: MigrationLedger::new(),
        })
    }

    /// Returns the configuration the worker was opened with.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Submits a statement.
    ///
    /// Returns a token when `want_result` is set or the statement is a
    /// `SELECT`; other statements run silently.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::QueueFull`] or [`WorkerError::EngineClosed`].
    pub fn execute(
        &self,
        sql: &str,
        params: &[Value],
        want_result: bool,
    ) -> Result<Option<Token>, WorkerError> {
        let kind = StatementKind::classify(sql);
        let retain = want_result || kind.is_read();
        let token = self.submit(sql, params, kind, retain)?;
        Ok(retain.then_some(token))
    }

    /// Submits a statement and always returns a token for its result.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::QueueFull`] or [`WorkerError::EngineClosed`].
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Token, WorkerError> {
        self.submit(sql, params, StatementKind::classify(sql), true)
    }

    /// Submits a statement and blocks until its rows are available.
    ///
    /// # Errors
    ///
    /// Returns submission errors, or [`WorkerError::Statement`] when the
    /// engine rejected the statement.
    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, WorkerError> {
        let token = self.query(sql, params)?;
        match self.fetch(token) {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(err)) => Err(WorkerError::Statement(err)),
            None => Err(WorkerError::EngineClosed),
        }
    }

    /// Blocks until the result for `token` is available and takes it.
    ///
    /// Returns `None` for unknown or already-fetched tokens.
    #[must_use]
    pub fn fetch(&self, token: Token) -> Option<StatementResult> {
        self.core.registry.fetch(token)
    }

    /// Waits up to `timeout` for the result of `token`.
    ///
    /// On timeout the result stays available for a later fetch; the statement
    /// still runs.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::FetchTimeout`] when the deadline elapses first.
    pub fn fetch_timeout(
        &self,
        token: Token,
        timeout: Duration,
    ) -> Result<Option<StatementResult>, WorkerError> {
        match self.core.registry.fetch_timeout(token, timeout) {
            FetchOutcome::Ready(outcome) => Ok(Some(outcome)),
            FetchOutcome::Absent => Ok(None),
            FetchOutcome::TimedOut => Err(WorkerError::FetchTimeout(token)),
        }
    }

    /// Reserves a slot when needed and enqueues the request.
    fn submit(
        &self,
        sql: &str,
        params: &[Value],
        kind: StatementKind,
        retain: bool,
    ) -> Result<Token, WorkerError> {
        let registry = &self.core.registry;
        let token = if retain { registry.reserve() } else { registry.mint() };
        let request = Request {
            token,
            statement: sql.to_string(),
            params: params.to_vec(),
            kind,
            retain,
            enqueued_at: Instant::now(),
        };
        match self.core.queue.submit(request) {
            Ok(()) => {
                self.core.stats.record_submitted();
                Ok(token)
            }
            Err(err) => {
                if retain {
                    registry.discard(token);
                }
                self.core.stats.record_rejected();
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Convenience Builders
    // ------------------------------------------------------------------------

    /// Inserts one row; the statement runs silently.
    ///
    /// # Errors
    ///
    /// Returns validation errors before anything is queued, then submission
    /// errors.
    pub fn insert(&self, table: &str, values: &[(&str, Value)]) -> Result<(), WorkerError> {
        let built = build_insert(table, values)?;
        self.execute(&built.sql, &built.params, false).map(drop)
    }

    /// Updates rows matching every condition; the statement runs silently.
    ///
    /// # Errors
    ///
    /// Returns validation errors before anything is queued, then submission
    /// errors.
    pub fn update(
        &self,
        table: &str,
        values: &[(&str, Value)],
        conditions: &[(&str, Value)],
    ) -> Result<(), WorkerError> {
        let built = build_update(table, values, conditions)?;
        self.execute(&built.sql, &built.params, false).map(drop)
    }

    /// Deletes rows matching every condition; the statement runs silently.
    ///
    /// # Errors
    ///
    /// Returns validation errors before anything is queued, then submission
    /// errors.
    pub fn delete(&self, table: &str, conditions: &[(&str, Value)]) -> Result<(), WorkerError> {
        let built = build_delete(table, conditions)?;
        self.execute(&built.sql, &built.params, false).map(drop)
    }

    /// Submits a select built from `query` and returns its token.
    ///
    /// # Errors
    ///
    /// Returns validation errors before anything is queued, then submission
    /// errors.
    pub fn select(&self, query: &SelectQuery) -> Result<Token, WorkerError> {
        let built = query.build()?;
        self.query(&built.sql, &built.params)
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// Opens an explicit transaction; implicit batching is suspended until it
    /// ends.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::TransactionAlreadyOpen`] or the `BEGIN` failure.
    pub fn begin(&self) -> Result<(), WorkerError> {
        self.transactions.begin(|sql| self.run_control(sql))
    }

    /// Commits the explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NoTransactionOpen`] or the `COMMIT` failure.
    pub fn commit(&self) -> Result<(), WorkerError> {
        self.transactions.commit(|sql| self.run_control(sql))
    }

    /// Rolls back the explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NoTransactionOpen`] or the `ROLLBACK` failure.
    pub fn rollback(&self) -> Result<(), WorkerError> {
        self.transactions.rollback(|sql| self.run_control(sql))
    }

    /// Returns `true` while an explicit transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transactions.is_open()
    }

    /// Runs `body` inside a transaction.
    ///
    /// Commits when `body` returns `Ok`; rolls back and returns the error when
    /// it returns `Err` or when the commit fails; rolls back if it panics.
    ///
    /// # Errors
    ///
    /// Returns the error from `begin`, `body`, or `commit`.
    pub fn transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<WorkerError>,
    {
        self.begin()?;
        let mut guard = RollbackGuard::new(|| self.rollback_logged());
        let outcome = body(self);
        guard.disarm();
        drop(guard);
        match outcome {
            Ok(value) => match self.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    self.rollback_logged();
                    Err(err.into())
                }
            },
            Err(err) => {
                self.rollback_logged();
                Err(err)
            }
        }
    }

    /// Runs a control statement and waits for it.
    fn run_control(&self, sql: &str) -> Result<(), WorkerError> {
        self.query_rows(sql, &[]).map(drop)
    }

    /// Rolls back if a transaction is open, logging failures.
    fn rollback_logged(&self) {
        match self.rollback() {
            Ok(()) | Err(WorkerError::NoTransactionOpen) => {}
            Err(err) => warn!(error = %err, "transaction rollback failed"),
        }
    }

    // ------------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------------

    /// Registers `callback` for `event`.
    ///
    /// The callback runs on the execution thread after each successful
    /// matching statement and before its result is published.
    pub fn register_hook<F>(&self, event: HookEvent, callback: F) -> HookId
    where
        F: Fn(&str, &[Value]) + Send + Sync + 'static,
    {
        self.core.hooks.register(event, Arc::new(callback))
    }

    /// Removes one hook (`Some(id)`) or every hook (`None`) for `event`.
    ///
    /// Returns the number of hooks removed.
    pub fn unregister_hook(&self, event: HookEvent, id: Option<HookId>) -> usize {
        self.core.hooks.unregister(event, id)
    }

    // ------------------------------------------------------------------------
    // Migrations
    // ------------------------------------------------------------------------

    /// Applies a migration; returns `false` when `version` is already
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns the failure that rolled the migration back.
    pub fn apply_migration(&self, version: &str, name: &str, sql: &str) -> Result<bool, WorkerError> {
        self.migrations.apply(self, version, name, sql)
    }

    /// Reverts a migration; returns `false` when `version` is not recorded.
    ///
    /// # Errors
    ///
    /// Returns the failure that rolled the revert back.
    pub fn rollback_migration(&self, version: &str, sql: &str) -> Result<bool, WorkerError> {
        self.migrations.rollback(self, version, sql)
    }

    /// Lists applied migrations in application order.
    ///
    /// # Errors
    ///
    /// Returns the failure reading the ledger.
    pub fn list_applied_migrations(&self) -> Result<Vec<MigrationRecord>, WorkerError> {
        MigrationLedger::list(self)
    }

    // ------------------------------------------------------------------------
    // Introspection and Lifecycle
    // ------------------------------------------------------------------------

    /// Returns the number of queued requests (advisory).
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.core.queue.depth()
    }

    /// Returns the execution loop state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.core.state()
    }

    /// Returns a snapshot of the diagnostics counters.
    #[must_use]
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.core.stats.snapshot()
    }

    /// Stops accepting work, drains the queue, commits, and joins the
    /// execution thread.
    ///
    /// Calling it again is a no-op. It must not be called from a hook.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Io`] when the execution thread panicked.
    pub fn close(&self) -> Result<(), WorkerError> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(thread) = handle.take() else {
            return Ok(());
        };
        self.core.queue.close();
        self.core.queue.send_shutdown();
        let joined = thread.join();
        self.core.registry.fail_all(&StatementError::aborted("sqlite worker closed"));
        joined.map_err(|_| WorkerError::Io("sqlite worker thread panicked".to_string()))
    }
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "sqlite worker shutdown on drop failed");
        }
    }
}
