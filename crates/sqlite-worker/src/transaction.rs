// crates/sqlite-worker/src/transaction.rs
// ============================================================================
// Module: Transaction Controller
// Description: Exclusion gate for explicit multi-statement transactions.
// Purpose: Allow at most one open transaction per worker and order its
//          control statements through the request queue.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! The controller does not execute SQL itself. Each operation takes a closure
//! that submits a control statement and waits for it; the closure runs while
//! the controller lock is held, so `begin`, `commit`, and `rollback` from
//! different threads cannot interleave.
//!
//! Invariants:
//! - `begin` while open fails with [`WorkerError::TransactionAlreadyOpen`].
//! - `commit`/`rollback` while closed fail with [`WorkerError::NoTransactionOpen`].
//! - A failed `COMMIT` leaves the transaction open; `rollback` always closes it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::error::WorkerError;

// ============================================================================
// SECTION: Controller
// ============================================================================

/// Tracks whether an explicit transaction is open.
#[derive(Debug, Default)]
pub struct TransactionController {
    /// `true` while a transaction is open.
    open: Mutex<bool>,
}

impl TransactionController {
    /// Creates a controller with no open transaction.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            open: Mutex::new(false),
        }
    }

    /// Opens a transaction by running `BEGIN` through `run`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::TransactionAlreadyOpen`] when one is open, or the
    /// failure reported by `run`.
    pub fn begin<F>(&self, run: F) -> Result<(), WorkerError>
    where
        F: FnOnce(&str) -> Result<(), WorkerError>,
    {
        let mut open = self.lock();
        if *open {
            return Err(WorkerError::TransactionAlreadyOpen);
        }
        run("BEGIN")?;
        *open = true;
        Ok(())
    }

    /// Commits the open transaction by running `COMMIT` through `run`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NoTransactionOpen`] when none is open, or the
    /// failure reported by `run` (the transaction then stays open).
    pub fn commit<F>(&self, run: F) -> Result<(), WorkerError>
    where
        F: FnOnce(&str) -> Result<(), WorkerError>,
    {
        let mut open = self.lock();
        if !*open {
            return Err(WorkerError::NoTransactionOpen);
        }
        run("COMMIT")?;
        *open = false;
        Ok(())
    }

    /// Rolls back the open transaction by running `ROLLBACK` through `run`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NoTransactionOpen`] when none is open, or the
    /// failure reported by `run`. The transaction is closed either way.
    pub fn rollback<F>(&self, run: F) -> Result<(), WorkerError>
    where
        F: FnOnce(&str) -> Result<(), WorkerError>,
    {
        let mut open = self.lock();
        if !*open {
            return Err(WorkerError::NoTransactionOpen);
        }
        *open = false;
        run("ROLLBACK")
    }

    /// Returns `true` while a transaction is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.lock()
    }

    /// Acquires the state lock, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Unwind Guard
// ============================================================================

/// Runs a rollback action when dropped while still armed.
///
/// Used by the scoped transaction helper so a panicking body still releases
/// the transaction.
pub struct RollbackGuard<F: FnMut()> {
    /// Pending rollback action; `None` once disarmed.
    rollback: Option<F>,
}

impl<F: FnMut()> RollbackGuard<F> {
    /// Arms the guard with `rollback`.
    pub const fn new(rollback: F) -> Self {
        Self {
            rollback: Some(rollback),
        }
    }

    /// Disarms the guard; dropping it afterwards does nothing.
    pub fn disarm(&mut self) {
        self.rollback = None;
    }
}

impl<F: FnMut()> Drop for RollbackGuard<F> {
    fn drop(&mut self) {
        if let Some(rollback) = self.rollback.as_mut() {
            rollback();
        }
    }
}
