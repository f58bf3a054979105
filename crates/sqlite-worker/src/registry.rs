// crates/sqlite-worker/src/registry.rs
// ============================================================================
// Module: Token Registry
// Description: Pending result slots keyed by request token.
// Purpose: Hand statement outcomes from the execution thread to any caller.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! Every submission mints a [`Token`] and reserves a slot before the request is
//! enqueued, so the execution thread can never publish ahead of the waiter.
//! The execution thread completes each slot exactly once; the fetching caller
//! takes the value exactly once.
//!
//! Locking: the slot map lock is held only to insert, look up, or remove an
//! entry. Waiting happens on the per-slot condition variable, never under the
//! map lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::Row;
use crate::error::StatementError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Opaque handle identifying one submitted request.
///
/// # Invariants
/// - Minted from a monotonically increasing sequence; never reused within one
///   worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u64);

impl Token {
    /// Returns the raw sequence number behind the token.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one statement: ordered rows, or the captured engine failure.
pub type StatementResult = Result<Vec<Row>, StatementError>;

/// Lifecycle of one result slot.
enum SlotState {
    /// Statement not yet executed.
    Pending,
    /// Outcome published and not yet taken.
    Ready(StatementResult),
    /// Outcome already handed to a caller.
    Taken,
}

/// One pending-or-ready result with its completion signal.
struct PendingSlot {
    /// Slot state guarded by its own lock.
    state: Mutex<SlotState>,
    /// Signalled once when the slot leaves [`SlotState::Pending`].
    ready: Condvar,
}

impl PendingSlot {
    /// Creates an empty pending slot.
    const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }

    /// Publishes an outcome if the slot is still pending and wakes waiters.
    fn publish(&self, outcome: StatementResult) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Ready(outcome);
            self.ready.notify_all();
        }
    }
}

/// Result of a bounded wait on a token.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The outcome was published and is now owned by the caller.
    Ready(StatementResult),
    /// The token is unknown or its outcome was already taken.
    Absent,
    /// The deadline elapsed first; the slot remains available.
    TimedOut,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Maps tokens to pending result slots.
///
/// # Invariants
/// - A slot is published at most once and taken at most once.
/// - Silent requests never retain their outcome in the map.
pub struct TokenRegistry {
    /// Next token sequence value.
    next: AtomicU64,
    /// Live slots keyed by token.
    slots: Mutex<HashMap<Token, Arc<PendingSlot>>>,
}

impl TokenRegistry {
    /// Creates an empty registry whose first token is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a fresh token without reserving a slot.
    pub fn mint(&self) -> Token {
        Token(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Mints a token and reserves its pending slot.
    pub fn reserve(&self) -> Token {
        let token = self.mint();
        self.lock_slots().insert(token, Arc::new(PendingSlot::new()));
        token
    }

    /// Drops a reserved slot whose request never reached the queue.
    pub fn discard(&self, token: Token) {
        self.lock_slots().remove(&token);
    }

    /// Publishes the outcome for `token`.
    ///
    /// Tokens without a reserved slot (silent requests) are ignored.
    pub fn complete(&self, token: Token, outcome: StatementResult) {
        let slot = self.lock_slots().get(&token).cloned();
        if let Some(slot) = slot {
            slot.publish(outcome);
        }
    }

    /// Blocks until the outcome for `token` is published, then takes it.
    ///
    /// Returns `None` for unknown or already-fetched tokens.
    pub fn fetch(&self, token: Token) -> Option<StatementResult> {
        match self.wait(token, None) {
            FetchOutcome::Ready(outcome) => Some(outcome),
            FetchOutcome::Absent | FetchOutcome::TimedOut => None,
        }
    }

    /// Waits up to `timeout` for the outcome of `token`.
    ///
    /// Timeouts past the representable range (e.g. [`Duration::MAX`]) wait
    /// until the outcome is published.
    pub fn fetch_timeout(&self, token: Token, timeout: Duration) -> FetchOutcome {
        self.wait(token, Some(timeout))
    }

    /// Publishes `error` to every slot still pending.
    ///
    /// Used when the execution thread stops so no waiter blocks forever.
    pub fn fail_all(&self, error: &StatementError) {
        let slots: Vec<Arc<PendingSlot>> = self.lock_slots().values().cloned().collect();
        for slot in slots {
            slot.publish(Err(error.clone()));
        }
    }

    /// Shared wait implementation for bounded and unbounded fetches.
    fn wait(&self, token: Token, timeout: Option<Duration>) -> FetchOutcome {
        let Some(slot) = self.lock_slots().get(&token).cloned() else {
            return FetchOutcome::Absent;
        };
        // A timeout too large to represent as an instant waits without bound.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        while matches!(*state, SlotState::Pending) {
            match deadline {
                None => {
                    state = slot.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return FetchOutcome::TimedOut;
                    }
                    let (guard, _) = slot
                        .ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }
        let taken = std::mem::replace(&mut *state, SlotState::Taken);
        drop(state);
        match taken {
            SlotState::Ready(outcome) => {
                self.lock_slots().remove(&token);
                FetchOutcome::Ready(outcome)
            }
            SlotState::Pending | SlotState::Taken => FetchOutcome::Absent,
        }
    }

    /// Acquires the slot map lock, recovering from poisoning.
    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<Token, Arc<PendingSlot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
