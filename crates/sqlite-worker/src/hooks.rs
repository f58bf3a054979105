// crates/sqlite-worker/src/hooks.rs
// ============================================================================
// Module: Hook Dispatcher
// Description: Typed statement event subscriptions invoked by the executor.
// Purpose: Notify observers of executed statements in execution order.
// Dependencies: rusqlite, tracing, crate::statement
// ============================================================================

//! ## Overview
//! Callbacks subscribe to a [`HookEvent`] and are invoked synchronously on the
//! execution thread after a statement succeeds and before its result is
//! published. Observers therefore see a strict total order matching execution.
//!
//! Invariants:
//! - The hook list lock is released before any callback runs.
//! - A panicking callback is caught and logged; dispatch and result delivery
//!   continue.
//! - Callbacks must not wait on a token from inside the callback; the
//!   execution thread is the one that would publish it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rusqlite::types::Value;
use tracing::error;

use crate::statement::StatementKind;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Statement events that hooks can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Every executed statement.
    AnyQuery,
    /// Statements whose leading keyword is `INSERT` or `REPLACE`.
    Insert,
    /// Statements whose leading keyword is `UPDATE`.
    Update,
    /// Statements whose leading keyword is `DELETE`.
    Delete,
    /// Statements whose leading keyword is `SELECT`.
    Select,
}

impl HookEvent {
    /// Returns the kind-specific event for a statement, if any.
    #[must_use]
    pub const fn for_kind(kind: StatementKind) -> Option<Self> {
        match kind {
            StatementKind::Select => Some(Self::Select),
            StatementKind::Insert => Some(Self::Insert),
            StatementKind::Update => Some(Self::Update),
            StatementKind::Delete => Some(Self::Delete),
            StatementKind::TransactionControl | StatementKind::Other => None,
        }
    }

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AnyQuery => "any_query",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Select => "select",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked with the statement text and its bound parameters.
pub type HookCallback = Arc<dyn Fn(&str, &[Value]) + Send + Sync>;

/// Opaque handle returned by hook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Per-event ordered callback lists guarded by one lock.
pub struct HookDispatcher {
    /// Next hook identifier.
    next: AtomicU64,
    /// Registered callbacks in registration order.
    hooks: Mutex<HashMap<HookEvent, Vec<(HookId, HookCallback)>>>,
}

impl HookDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            hooks: Mutex::new(HashMap::new()),
        }
    }

    /// Appends `callback` to the list for `event`.
    pub fn register(&self, event: HookEvent, callback: HookCallback) -> HookId {
        let id = HookId(self.next.fetch_add(1, Ordering::Relaxed));
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push((id, callback));
        id
    }

    /// Removes one hook (`Some(id)`) or every hook (`None`) for `event`.
    ///
    /// Returns the number of hooks removed.
    pub fn unregister(&self, event: HookEvent, id: Option<HookId>) -> usize {
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = hooks.get_mut(&event) else {
            return 0;
        };
        let before = list.len();
        match id {
            Some(id) => list.retain(|(existing, _)| *existing != id),
            None => list.clear(),
        }
        let removed = before - list.len();
        if list.is_empty() {
            hooks.remove(&event);
        }
        removed
    }

    /// Invokes the kind-specific hooks, then the `AnyQuery` hooks.
    ///
    /// Returns the number of callbacks that panicked.
    pub fn dispatch(&self, kind: StatementKind, statement: &str, params: &[Value]) -> u64 {
        let callbacks = self.snapshot(kind);
        let mut failures = 0;
        for (event, id, callback) in callbacks {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(statement, params)));
            if outcome.is_err() {
                failures += 1;
                error!(event = %event, hook = %id, "statement hook panicked");
            }
        }
        failures
    }

    /// Clones the callbacks to run so the lock is not held during dispatch.
    fn snapshot(&self, kind: StatementKind) -> Vec<(HookEvent, HookId, HookCallback)> {
        let hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        HookEvent::for_kind(kind)
            .into_iter()
            .chain(std::iter::once(HookEvent::AnyQuery))
            .filter_map(|event| hooks.get(&event).map(|list| (event, list)))
            .flat_map(|(event, list)| {
                list.iter().map(move |(id, callback)| (event, *id, Arc::clone(callback)))
            })
            .collect()
    }
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
