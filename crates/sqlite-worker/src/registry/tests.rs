// crates/sqlite-worker/src/registry/tests.rs
// ============================================================================
// Module: Token Registry Unit Tests
// Description: Single delivery, unknown tokens, timeouts, and abort fan-out.
// Purpose: Validate the slot lifecycle independently of the execution thread.
// Dependencies: sqlite-worker
// ============================================================================

//! ## Overview
//! Unit tests for the token registry slot lifecycle.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions are permitted."
)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusqlite::types::Value;

use super::FetchOutcome;
use super::TokenRegistry;
use crate::error::StatementError;
use crate::error::StatementErrorKind;

#[test]
fn tokens_are_unique_and_increasing() {
    let registry = TokenRegistry::new();
    let first = registry.reserve();
    let second = registry.mint();
    let third = registry.reserve();
    assert!(first < second);
    assert!(second < third);
    assert_eq!(first.get(), 1);
}

#[test]
fn fetch_delivers_exactly_once() {
    let registry = TokenRegistry::new();
    let token = registry.reserve();
    registry.complete(token, Ok(vec![vec![Value::Integer(7)]]));
    let rows = registry.fetch(token).unwrap().unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(7)]]);
    assert!(registry.fetch(token).is_none());
}

#[test]
fn fetch_unknown_token_returns_none() {
    let registry = TokenRegistry::new();
    let token = registry.mint();
    assert!(registry.fetch(token).is_none());
}

#[test]
fn completion_for_unreserved_token_is_ignored() {
    let registry = TokenRegistry::new();
    let token = registry.mint();
    registry.complete(token, Ok(Vec::new()));
    assert!(registry.fetch(token).is_none());
}

#[test]
fn fetch_blocks_until_completion_from_other_thread() {
    let registry = Arc::new(TokenRegistry::new());
    let token = registry.reserve();
    let producer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            registry.complete(token, Ok(vec![vec![Value::Text("done".to_string())]]));
        })
    };
    let rows = registry.fetch(token).unwrap().unwrap();
    producer.join().unwrap();
    assert_eq!(rows[0][0], Value::Text("done".to_string()));
}

#[test]
fn fetch_timeout_keeps_slot_for_later_fetch() {
    let registry = TokenRegistry::new();
    let token = registry.reserve();
    assert!(matches!(
        registry.fetch_timeout(token, Duration::from_millis(20)),
        FetchOutcome::TimedOut
    ));
    registry.complete(token, Ok(Vec::new()));
    assert!(matches!(
        registry.fetch_timeout(token, Duration::from_millis(20)),
        FetchOutcome::Ready(Ok(_))
    ));
    assert!(matches!(
        registry.fetch_timeout(token, Duration::from_millis(20)),
        FetchOutcome::Absent
    ));
}

#[test]
fn second_completion_does_not_overwrite_first() {
    let registry = TokenRegistry::new();
    let token = registry.reserve();
    registry.complete(token, Ok(vec![vec![Value::Integer(1)]]));
    registry.complete(token, Err(StatementError::aborted("late")));
    assert!(registry.fetch(token).unwrap().is_ok());
}

#[test]
fn fail_all_releases_waiters_with_aborted_error() {
    let registry = Arc::new(TokenRegistry::new());
    let token = registry.reserve();
    let waiter = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.fetch(token))
    };
    thread::sleep(Duration::from_millis(20));
    registry.fail_all(&StatementError::aborted("worker stopped"));
    let outcome = waiter.join().unwrap().unwrap();
    assert_eq!(outcome.unwrap_err().kind, StatementErrorKind::Aborted);
}

#[test]
fn discard_removes_reserved_slot() {
    let registry = TokenRegistry::new();
    let token = registry.reserve();
    registry.discard(token);
    assert!(registry.fetch(token).is_none());
}

#[test]
fn fetch_timeout_with_unbounded_duration_returns_ready_outcome() {
    let registry = TokenRegistry::new();
    let token = registry.reserve();
    registry.complete(token, Ok(vec![vec![Value::Integer(3)]]));
    match registry.fetch_timeout(token, Duration::MAX) {
        FetchOutcome::Ready(outcome) => {
            assert_eq!(outcome.unwrap(), vec![vec![Value::Integer(3)]]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn fetch_timeout_with_unbounded_duration_waits_for_completion() {
    let registry = Arc::new(TokenRegistry::new());
    let token = registry.reserve();
    let publisher = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            registry.complete(token, Ok(Vec::new()));
        })
    };
    let outcome = registry.fetch_timeout(token, Duration::MAX);
    publisher.join().unwrap();
    assert!(matches!(outcome, FetchOutcome::Ready(Ok(rows)) if rows.is_empty()));
}
