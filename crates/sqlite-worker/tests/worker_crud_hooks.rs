// crates/sqlite-worker/tests/worker_crud_hooks.rs
// ============================================================================
// Module: SQLite Worker Builder and Hook Tests
// Description: CRUD helpers, identifier rejection, and hook dispatch.
// Purpose: Validate the convenience layer and observer isolation end to end.
// ============================================================================

//! ## Overview
//! Integration tests for builders and hooks:
//! - insert/select round trip in submission order
//! - injected identifiers never reach the execution thread
//! - hooks observe execution order and survive panicking peers

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::Mutex;

use sqlite_worker::HookEvent;
use sqlite_worker::SelectQuery;
use sqlite_worker::Value;
use sqlite_worker::WorkerError;

use crate::common::count;
use crate::common::open_memory;
use crate::common::open_people;
use crate::common::people;
use crate::common::text;

// ============================================================================
// SECTION: Builders
// ============================================================================

#[test]
fn insert_then_select_ordered_by_name() {
    let worker = open_memory();
    worker.query_rows("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
    worker.insert("t", &[("name", text("Alice"))]).unwrap();
    worker.insert("t", &[("name", text("Bob"))]).unwrap();
    let token = worker.select(&SelectQuery::new("t").order_by("name")).unwrap();
    let rows = worker.fetch(token).unwrap().unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(1), text("Alice")], vec![
        Value::Integer(2),
        text("Bob")
    ]]);
}

#[test]
fn injected_table_name_is_rejected_and_table_survives() {
    let worker = open_people();
    worker.insert("people", &[("name", text("Alice"))]).unwrap();
    let before = worker.stats().submitted;
    let err = worker.insert("people; DROP TABLE people; --", &[("name", text("x"))]).unwrap_err();
    assert!(matches!(err, WorkerError::InvalidIdentifier(_)));
    let err = worker.insert("people", &[("name;DROP", text("x"))]).unwrap_err();
    assert!(matches!(err, WorkerError::InvalidIdentifier(_)));
    let err = worker
        .select(&SelectQuery::new("people").order_by("name; DROP TABLE people"))
        .unwrap_err();
    assert!(matches!(err, WorkerError::InvalidIdentifier(_)));
    assert_eq!(worker.stats().submitted, before);
    assert_eq!(count(&worker, "people"), 1);
}

#[test]
fn update_and_delete_by_condition() {
    let worker = open_people();
    for name in ["Alice", "Bob", "Carol"] {
        worker.insert("people", &[("name", text(name))]).unwrap();
    }
    worker.update("people", &[("name", text("Bobby"))], &[("name", text("Bob"))]).unwrap();
    worker.delete("people", &[("id", Value::Integer(1))]).unwrap();
    assert_eq!(people(&worker), vec![(2, "Bobby".to_string()), (3, "Carol".to_string())]);
}

#[test]
fn select_with_columns_filter_order_and_limit() {
    let worker = open_memory();
    worker
        .query_rows("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)", &[])
        .unwrap();
    for (name, age) in [("Ann", 30), ("Ben", 40), ("Cid", 35), ("Dee", 40)] {
        worker.insert("users", &[("name", text(name)), ("age", Value::Integer(age))]).unwrap();
    }
    let query = SelectQuery::new("users")
        .columns(["name"])
        .filter("age", 40_i64)
        .order_by("name DESC")
        .limit(1);
    let rows = worker.fetch(worker.select(&query).unwrap()).unwrap().unwrap();
    assert_eq!(rows, vec![vec![text("Dee")]]);
}

#[test]
fn empty_maps_are_rejected_before_queueing() {
    let worker = open_people();
    assert!(matches!(worker.insert("people", &[]).unwrap_err(), WorkerError::InvalidArgument(_)));
    assert!(matches!(worker.delete("people", &[]).unwrap_err(), WorkerError::InvalidArgument(_)));
    assert!(matches!(
        worker.update("people", &[("name", text("x"))], &[]).unwrap_err(),
        WorkerError::InvalidArgument(_)
    ));
}

// ============================================================================
// SECTION: Hooks
// ============================================================================

#[test]
fn hooks_observe_statements_in_execution_order() {
    let worker = open_people();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for (event, label) in [
        (HookEvent::Insert, "insert"),
        (HookEvent::Update, "update"),
        (HookEvent::Delete, "delete"),
        (HookEvent::Select, "select"),
    ] {
        let seen = Arc::clone(&seen);
        worker.register_hook(event, move |_, params| {
            seen.lock().unwrap().push(format!("{label}:{}", params.len()));
        });
    }
    worker.insert("people", &[("name", text("Alice"))]).unwrap();
    worker.update("people", &[("name", text("Ann"))], &[("id", Value::Integer(1))]).unwrap();
    worker.query_rows("SELECT * FROM people", &[]).unwrap();
    worker.delete("people", &[("id", Value::Integer(1))]).unwrap();
    worker.query_rows("SELECT 1", &[]).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["insert:1", "update:2", "select:0", "delete:1", "select:0"]);
}

#[test]
fn any_query_hook_sees_statement_text_and_failures_do_not_fire() {
    let worker = open_people();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        worker.register_hook(HookEvent::AnyQuery, move |sql, _| {
            seen.lock().unwrap().push(sql.to_string());
        });
    }
    let bad = worker.query("SELECT * FROM nowhere", &[]).unwrap();
    assert!(worker.fetch(bad).unwrap().is_err());
    worker.query_rows("SELECT 42", &[]).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["SELECT 42".to_string()]);
}

#[test]
fn panicking_hook_does_not_block_delivery() {
    let worker = open_people();
    worker.register_hook(HookEvent::AnyQuery, |_, _| panic!("hook always fails"));
    for name in ["Alice", "Bob"] {
        worker.insert("people", &[("name", text(name))]).unwrap();
    }
    assert_eq!(people(&worker).len(), 2);
    assert!(worker.stats().hook_failures >= 3);
}

#[test]
fn unregistered_hooks_stop_firing() {
    let worker = open_people();
    let calls = Arc::new(Mutex::new(0_u32));
    let id = {
        let calls = Arc::clone(&calls);
        worker.register_hook(HookEvent::Insert, move |_, _| *calls.lock().unwrap() += 1)
    };
    worker.insert("people", &[("name", text("Alice"))]).unwrap();
    worker.query_rows("SELECT 1", &[]).unwrap();
    assert_eq!(worker.unregister_hook(HookEvent::Insert, Some(id)), 1);
    worker.insert("people", &[("name", text("Bob"))]).unwrap();
    worker.query_rows("SELECT 1", &[]).unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(worker.unregister_hook(HookEvent::Insert, None), 0);
}
