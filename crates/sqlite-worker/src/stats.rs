// crates/sqlite-worker/src/stats.rs
// ============================================================================
// Module: Worker Diagnostics
// Description: Lock-free counters describing execution loop activity.
// Purpose: Expose throughput, failure, and exclusion evidence to operators.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Counters are updated with relaxed atomics; a snapshot is a best-effort read
//! and is not synchronized with in-flight work.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Point-in-time copy of the worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Requests accepted by the queue.
    pub submitted: u64,
    /// Submissions refused (queue full or engine closed).
    pub rejected: u64,
    /// Statements executed by the loop, successful or not.
    pub executed: u64,
    /// Statements whose outcome was a statement error.
    pub statement_errors: u64,
    /// Busy/locked retries performed.
    pub contention_retries: u64,
    /// Implicit batch commits performed.
    pub commits: u64,
    /// Successful reconnects.
    pub reconnects: u64,
    /// Implicit batches whose writes were discarded instead of committed
    /// (rolled back by `SQLite`, failed to commit, or lost with the
    /// connection).
    pub batches_lost: u64,
    /// Hook callbacks that panicked.
    pub hook_failures: u64,
    /// Peak number of statements observed executing at once.
    pub max_concurrent_executions: u64,
}

// ============================================================================
// SECTION: Counters
// ============================================================================

/// Shared atomic counters behind [`WorkerStatsSnapshot`].
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// See [`WorkerStatsSnapshot::submitted`].
    submitted: AtomicU64,
    /// See [`WorkerStatsSnapshot::rejected`].
    rejected: AtomicU64,
    /// See [`WorkerStatsSnapshot::executed`].
    executed: AtomicU64,
    /// See [`WorkerStatsSnapshot::statement_errors`].
    statement_errors: AtomicU64,
    /// See [`WorkerStatsSnapshot::contention_retries`].
    contention_retries: AtomicU64,
    /// See [`WorkerStatsSnapshot::commits`].
    commits: AtomicU64,
    /// See [`WorkerStatsSnapshot::reconnects`].
    reconnects: AtomicU64,
    /// See [`WorkerStatsSnapshot::batches_lost`].
    batches_lost: AtomicU64,
    /// See [`WorkerStatsSnapshot::hook_failures`].
    hook_failures: AtomicU64,
    /// Statements currently executing.
    executing: AtomicU64,
    /// See [`WorkerStatsSnapshot::max_concurrent_executions`].
    max_concurrent_executions: AtomicU64,
}

impl WorkerStats {
    /// Records an accepted submission.
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refused submission.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a statement error outcome.
    pub fn record_statement_error(&self) {
        self.statement_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one busy/locked retry.
    pub fn record_contention_retry(&self) {
        self.contention_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an implicit batch commit.
    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful reconnect.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an implicit batch that was discarded.
    pub fn record_batch_lost(&self) {
        self.batches_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Records panicking hook callbacks.
    pub fn record_hook_failures(&self, count: u64) {
        if count > 0 {
            self.hook_failures.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Marks a statement as executing and updates the concurrency peak.
    pub fn enter_execution(&self) {
        let current = self.executing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_executions.fetch_max(current, Ordering::SeqCst);
    }

    /// Marks the executing statement as finished.
    pub fn exit_execution(&self) {
        self.executing.fetch_sub(1, Ordering::SeqCst);
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            statement_errors: self.statement_errors.load(Ordering::Relaxed),
            contention_retries: self.contention_retries.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            batches_lost: self.batches_lost.load(Ordering::Relaxed),
            hook_failures: self.hook_failures.load(Ordering::Relaxed),
            max_concurrent_executions: self.max_concurrent_executions.load(Ordering::SeqCst),
        }
    }
}
