// crates/sqlite-worker/tests/common/mod.rs
// ============================================================================
// Module: SQLite Worker Test Helpers
// Description: Shared constructors and fixtures for integration tests.
// Purpose: Keep worker setup consistent across test binaries.
// ============================================================================

//! ## Overview
//! Helpers shared by the `sqlite-worker` integration tests.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Each test binary uses a different subset of helpers."
)]

use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc;

use sqlite_worker::HookEvent;
use sqlite_worker::SqliteWorker;
use sqlite_worker::Value;
use sqlite_worker::WorkerConfig;

/// Configuration with short retry and poll intervals for tests.
pub fn fast_config(path: impl AsRef<Path>) -> WorkerConfig {
    WorkerConfig {
        retry_delay_ms: 10,
        poll_interval_ms: 20,
        submit_timeout_ms: 1_000,
        ..WorkerConfig::new(path.as_ref())
    }
}

/// Opens a worker over a private in-memory database.
pub fn open_memory() -> SqliteWorker {
    SqliteWorker::open(fast_config(":memory:")).expect("open in-memory worker")
}

/// Opens an in-memory worker with the `people` table created.
pub fn open_people() -> SqliteWorker {
    let worker = open_memory();
    worker
        .query_rows("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)", &[])
        .expect("create people table");
    worker
}

/// Builds a text value.
pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

/// Returns every `people` row ordered by id.
pub fn people(worker: &SqliteWorker) -> Vec<(i64, String)> {
    worker
        .query_rows("SELECT id, name FROM people ORDER BY id", &[])
        .expect("select people")
        .into_iter()
        .map(|row| match row.as_slice() {
            [Value::Integer(id), Value::Text(name)] => (*id, name.clone()),
            other => panic!("unexpected people row: {other:?}"),
        })
        .collect()
}

/// Counts rows in `table`.
pub fn count(worker: &SqliteWorker, table: &str) -> i64 {
    let rows = worker
        .query_rows(&format!("SELECT COUNT(*) FROM {table}"), &[])
        .expect("count rows");
    match rows.as_slice() {
        [row] => match row.as_slice() {
            [Value::Integer(count)] => *count,
            other => panic!("unexpected count row: {other:?}"),
        },
        other => panic!("unexpected count result: {other:?}"),
    }
}

/// Installs a hook that parks the execution thread on its first statement
/// until the returned sender is used (or dropped).
pub fn park_executor(worker: &SqliteWorker) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(Some(entered_tx));
    let release_rx = Mutex::new(release_rx);
    worker.register_hook(HookEvent::AnyQuery, move |_, _| {
        let first = entered_tx.lock().unwrap().take();
        if let Some(entered) = first {
            entered.send(()).unwrap();
            let _ = release_rx.lock().unwrap().recv();
        }
    });
    (entered_rx, release_tx)
}
