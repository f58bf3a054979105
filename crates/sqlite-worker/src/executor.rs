// crates/sqlite-worker/src/executor.rs
// ============================================================================
// Module: Execution Loop
// Description: Dedicated thread that owns the SQLite connection.
// Purpose: Serialize every statement, batch commits, and publish outcomes.
// Dependencies: crossbeam-channel, rusqlite, tracing
// ============================================================================

//! ## Overview
//! The execution loop is the only code that touches the connection. It moves
//! through `Starting -> Running -> Draining -> Stopped`:
//! - `Starting`: open the connection, replay init statements, create the
//!   migration ledger. [`spawn`] returns only after this phase succeeds.
//! - `Running`: dequeue with a poll timeout, execute, dispatch hooks, publish.
//!   Data statements join an implicit batch committed every
//!   `commit_batch_size` statements or whenever the queue is momentarily
//!   empty. While the connection is inside an explicit transaction no
//!   implicit batch is opened, so only the caller's `COMMIT`/`ROLLBACK`
//!   flushes.
//! - `Draining`: after the shutdown sentinel, execute everything still queued,
//!   commit, close the connection.
//!
//! Invariants:
//! - Statement errors are published as values; they never stop the loop.
//! - Only connection loss with exhausted reconnects stops the loop early, and
//!   every outstanding slot is then completed with an aborted error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use rusqlite::Connection;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::Row;
use crate::config::WorkerConfig;
use crate::error::StatementError;
use crate::error::WorkerError;
use crate::hooks::HookDispatcher;
use crate::queue::QueueMessage;
use crate::queue::Request;
use crate::queue::RequestQueue;
use crate::queue::next_remaining;
use crate::registry::StatementResult;
use crate::registry::TokenRegistry;
use crate::stats::WorkerStats;
use crate::statement::StatementKind;
use crate::supervisor::FailureClass;
use crate::supervisor::RetryPolicy;
use crate::supervisor::classify_failure;
use crate::supervisor::open_connection;
use crate::supervisor::reconnect_with_retry;
use crate::supervisor::retry_contended;

// ============================================================================
// SECTION: State
// ============================================================================

/// Lifecycle state of the execution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Opening the connection and replaying init statements.
    Starting,
    /// Accepting and executing requests.
    Running,
    /// Shutdown requested; executing what is left in the queue.
    Draining,
    /// Connection closed; no further work is accepted.
    Stopped,
}

impl WorkerState {
    /// Encodes the state for atomic storage.
    const fn to_u8(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Running => 1,
            Self::Draining => 2,
            Self::Stopped => 3,
        }
    }

    /// Decodes a stored state.
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// State shared between the public handle and the execution thread.
pub struct EngineCore {
    /// Producer side of the request queue.
    pub queue: RequestQueue,
    /// Result slots keyed by token.
    pub registry: TokenRegistry,
    /// Statement hooks.
    pub hooks: HookDispatcher,
    /// Diagnostics counters.
    pub stats: WorkerStats,
    /// Encoded [`WorkerState`].
    state: AtomicU8,
}

impl EngineCore {
    /// Creates the shared core around a fresh queue.
    #[must_use]
    pub fn new(queue: RequestQueue) -> Self {
        Self {
            queue,
            registry: TokenRegistry::new(),
            hooks: HookDispatcher::new(),
            stats: WorkerStats::default(),
            state: AtomicU8::new(WorkerState::Starting.to_u8()),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Publishes a lifecycle transition.
    fn set_state(&self, state: WorkerState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }
}

// ============================================================================
// SECTION: Spawn
// ============================================================================

/// Starts the execution thread and waits until it reaches `Running`.
///
/// # Errors
///
/// Returns the connection or initialization failure observed while starting,
/// or [`WorkerError::Io`] when the thread cannot be spawned.
pub fn spawn(
    core: Arc<EngineCore>,
    receiver: Receiver<QueueMessage>,
    config: WorkerConfig,
) -> Result<JoinHandle<()>, WorkerError> {
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), WorkerError>>();
    let handle = thread::Builder::new()
        .name("sqlite-worker".to_string())
        .spawn(move || {
            let connection = match open_connection(&config) {
                Ok(connection) => connection,
                Err(err) => {
                    core.queue.close();
                    core.set_state(WorkerState::Stopped);
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            core.set_state(WorkerState::Running);
            info!(
                path = %config.path.display(),
                capacity = config.queue_capacity,
                "sqlite worker running"
            );
            let _ = ready_tx.send(Ok(()));
            let executor = Executor {
                policy: RetryPolicy::from_config(&config),
                core,
                receiver,
                connection: Some(connection),
                config,
                batch_open: false,
                batch_len: 0,
            };
            executor.run();
        })
        .map_err(|err| WorkerError::Io(err.to_string()))?;
    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err)
        }
        Err(_) => {
            let _ = handle.join();
            Err(WorkerError::Io("sqlite worker thread exited during startup".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Execution loop state owned by the worker thread.
struct Executor {
    /// Shared queue, registry, hooks, and counters.
    core: Arc<EngineCore>,
    /// Consumer side of the request queue.
    receiver: Receiver<QueueMessage>,
    /// Live connection; `None` only while reconnecting or after close.
    connection: Option<Connection>,
    /// Engine configuration.
    config: WorkerConfig,
    /// Retry bound and delay.
    policy: RetryPolicy,
    /// Whether an implicit batch transaction is open.
    batch_open: bool,
    /// Statements executed inside the open implicit batch.
    batch_len: usize,
}

impl Executor {
    /// Runs until shutdown or a fatal connection failure.
    fn run(mut self) {
        loop {
            match self.receiver.recv_timeout(self.config.poll_interval()) {
                Ok(QueueMessage::Request(request)) => {
                    if let Err(err) = self.process(request) {
                        self.abort(&err);
                        return;
                    }
                }
                Ok(QueueMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    self.drain();
                    return;
                }
                // Idle poll: batches are already flushed whenever the queue empties.
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Executes one request and publishes its outcome.
    fn process(&mut self, request: Request) -> Result<(), WorkerError> {
        trace!(
            token = %request.token,
            queued_us = u64::try_from(request.enqueued_at.elapsed().as_micros()).unwrap_or(u64::MAX),
            "executing statement"
        );
        match request.kind {
            StatementKind::TransactionControl | StatementKind::Other => self.commit_batch()?,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                self.open_batch()?;
            }
            StatementKind::Select => {}
        }

        self.core.stats.enter_execution();
        let executed = self.execute_with_recovery(&request.statement, &request.params);
        self.core.stats.exit_execution();
        let outcome = executed?;

        if self.batch_open && self.connection()?.is_autocommit() {
            warn!(
                token = %request.token,
                statements = self.batch_len,
                "sqlite rolled back the open batch"
            );
            self.core.stats.record_batch_lost();
            self.batch_open = false;
            self.batch_len = 0;
        }

        match &outcome {
            Ok(_) => {
                let failures =
                    self.core.hooks.dispatch(request.kind, &request.statement, &request.params);
                self.core.stats.record_hook_failures(failures);
            }
            Err(err) => {
                self.core.stats.record_statement_error();
                warn!(token = %request.token, kind = %err.kind, message = %err.message, "statement failed");
            }
        }
        if request.retain {
            self.core.registry.complete(request.token, outcome);
        }

        if self.batch_open {
            self.batch_len += 1;
            if self.batch_len >= self.config.commit_batch_size || self.receiver.is_empty() {
                self.commit_batch()?;
            }
        }
        Ok(())
    }

    /// Executes a statement, retrying contention and reconnecting on
    /// connection loss.
    ///
    /// The outer error is fatal to the loop; the inner result is the
    /// statement outcome published to the caller.
    fn execute_with_recovery(
        &mut self,
        statement: &str,
        params: &[Value],
    ) -> Result<StatementResult, WorkerError> {
        let mut reconnected = false;
        loop {
            let connection = self.connection()?;
            let attempt = retry_contended(self.policy, &self.core.stats, || {
                run_statement(connection, statement, params)
            });
            match attempt {
                Ok(rows) => return Ok(Ok(rows)),
                Err(err) if classify_failure(&err) == FailureClass::Connection => {
                    if reconnected {
                        return Err(WorkerError::Connection(err.to_string()));
                    }
                    warn!(error = %err, "sqlite connection failure");
                    self.reconnect(&err)?;
                    reconnected = true;
                }
                Err(err) => return Ok(Err(StatementError::from_sqlite(&err))),
            }
        }
    }

    /// Replaces the connection after a connection-level failure.
    fn reconnect(&mut self, cause: &rusqlite::Error) -> Result<(), WorkerError> {
        if !self.config.auto_reconnect {
            return Err(WorkerError::Connection(cause.to_string()));
        }
        if self.batch_open {
            warn!(statements = self.batch_len, "uncommitted batch lost with the connection");
            self.core.stats.record_batch_lost();
            self.batch_open = false;
            self.batch_len = 0;
        }
        self.connection = None;
        let config = &self.config;
        let connection = reconnect_with_retry(self.policy, || open_connection(config))?;
        self.connection = Some(connection);
        self.core.stats.record_reconnect();
        info!("sqlite connection reopened");
        Ok(())
    }

    /// Opens an implicit batch when the connection is in autocommit mode.
    fn open_batch(&mut self) -> Result<(), WorkerError> {
        if self.batch_open {
            return Ok(());
        }
        let connection = self.connection()?;
        if !connection.is_autocommit() {
            return Ok(());
        }
        match retry_contended(self.policy, &self.core.stats, || connection.execute_batch("BEGIN")) {
            Ok(()) => {
                self.batch_open = true;
                self.batch_len = 0;
            }
            Err(err) => warn!(error = %err, "could not open batch; statement runs in autocommit"),
        }
        Ok(())
    }

    /// Commits the open implicit batch, if any.
    fn commit_batch(&mut self) -> Result<(), WorkerError> {
        if !self.batch_open {
            return Ok(());
        }
        let statements = self.batch_len;
        self.batch_open = false;
        self.batch_len = 0;
        let connection = self.connection()?;
        match retry_contended(self.policy, &self.core.stats, || connection.execute_batch("COMMIT")) {
            Ok(()) => {
                self.core.stats.record_commit();
                debug!(statements, "committed batch");
                Ok(())
            }
            Err(err) if classify_failure(&err) == FailureClass::Connection => {
                warn!(statements, error = %err, "batch commit lost with the connection");
                self.core.stats.record_batch_lost();
                self.reconnect(&err)
            }
            Err(err) => {
                warn!(statements, error = %err, "batch commit failed; rolling back");
                self.core.stats.record_batch_lost();
                if !connection.is_autocommit()
                    && let Err(rollback_err) = connection.execute_batch("ROLLBACK")
                {
                    warn!(error = %rollback_err, "batch rollback failed");
                }
                Ok(())
            }
        }
    }

    /// Executes queued work after the shutdown sentinel, then stops.
    fn drain(mut self) {
        self.core.queue.close();
        self.core.set_state(WorkerState::Draining);
        debug!(queued = self.receiver.len(), "draining request queue");
        while let Some(request) = next_remaining(&self.core.queue, &self.receiver) {
            if let Err(err) = self.process(request) {
                self.abort(&err);
                return;
            }
        }
        if let Err(err) = self.commit_batch() {
            warn!(error = %err, "final batch commit failed");
        }
        if let Some(connection) = self.connection.take() {
            if !connection.is_autocommit()
                && let Err(err) = connection.execute_batch("COMMIT")
            {
                warn!(error = %err, "final commit of open transaction failed");
            }
            if let Err((_, err)) = connection.close() {
                warn!(error = %err, "sqlite connection close failed");
            }
        }
        let Self {
            core,
            receiver,
            ..
        } = self;
        drop(receiver);
        core.registry.fail_all(&StatementError::aborted("sqlite worker closed"));
        core.set_state(WorkerState::Stopped);
        info!(executed = core.stats.snapshot().executed, "sqlite worker stopped");
    }

    /// Stops the loop after a fatal failure and aborts all outstanding work.
    fn abort(self, cause: &WorkerError) {
        error!(error = %cause, "sqlite worker stopping after fatal error");
        self.core.queue.close();
        let Self {
            core,
            receiver,
            connection,
            ..
        } = self;
        drop(connection);
        core.set_state(WorkerState::Stopped);
        let aborted = StatementError::aborted(&cause.to_string());
        while let Some(request) = next_remaining(&core.queue, &receiver) {
            core.registry.complete(request.token, Err(aborted.clone()));
        }
        drop(receiver);
        core.registry.fail_all(&aborted);
    }

    /// Returns the live connection.
    fn connection(&self) -> Result<&Connection, WorkerError> {
        self.connection
            .as_ref()
            .ok_or_else(|| WorkerError::Connection("sqlite connection unavailable".to_string()))
    }
}

// ============================================================================
// SECTION: Statement Execution
// ============================================================================

/// Runs one statement and collects every produced row.
fn run_statement(
    connection: &Connection,
    statement: &str,
    params: &[Value],
) -> rusqlite::Result<Vec<Row>> {
    let mut prepared = connection.prepare_cached(statement)?;
    let column_count = prepared.column_count();
    let mut rows = prepared.query(params_from_iter(params))?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for index in 0 .. column_count {
            values.push(row.get::<_, Value>(index)?);
        }
        collected.push(values);
    }
    Ok(collected)
}
