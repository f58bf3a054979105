// crates/sqlite-worker-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, values).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

//! Config load validation tests for sqlite-worker-config.

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

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use sqlite_worker::JournalMode;
use sqlite_worker::SyncMode;
use sqlite_worker::WorkerConfig;
use sqlite_worker_config::ConfigError;
use sqlite_worker_config::config_toml_example;
use sqlite_worker_config::load;
use sqlite_worker_config::parse;
use tempfile::NamedTempFile;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<WorkerConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(content: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content).map_err(|err| err.to_string())?;
    Ok(file)
}

// ============================================================================
// SECTION: File Guards
// ============================================================================

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(load(Path::new(&long_path)), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(load(Path::new(&long_component)), "config path component too long")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'#'; 1_048_577])?;
    assert_invalid(load(file.path()), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(load(file.path()), "config file must be utf-8")
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    match load(&dir.path().join("absent.toml")) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn minimal_config_uses_defaults() -> TestResult {
    let config = parse("[worker]\npath = \":memory:\"\n").map_err(|err| err.to_string())?;
    if config != WorkerConfig::in_memory() {
        return Err(format!("unexpected defaults: {config:?}"));
    }
    Ok(())
}

#[test]
fn example_config_loads_from_disk() -> TestResult {
    let file = write_config(config_toml_example().as_bytes())?;
    let config = load(file.path()).map_err(|err| err.to_string())?;
    if config.path != PathBuf::from("data/worker.db")
        || config.init_statements != vec!["PRAGMA foreign_keys = ON".to_string()]
        || config.journal_mode != JournalMode::Wal
        || config.sync_mode != SyncMode::Full
        || config.queue_capacity != 100
    {
        return Err(format!("unexpected example config: {config:?}"));
    }
    Ok(())
}

#[test]
fn explicit_values_override_defaults() -> TestResult {
    let config = parse(
        "[worker]\npath = \":memory:\"\nqueue_capacity = 8\ncommit_batch_size = 2\n\
         auto_reconnect = false\njournal_mode = \"delete\"\nsync_mode = \"normal\"\n",
    )
    .map_err(|err| err.to_string())?;
    if config.queue_capacity != 8
        || config.commit_batch_size != 2
        || config.auto_reconnect
        || config.journal_mode != JournalMode::Delete
        || config.sync_mode != SyncMode::Normal
    {
        return Err(format!("overrides not applied: {config:?}"));
    }
    Ok(())
}

#[test]
fn parse_rejects_unknown_worker_key() -> TestResult {
    assert_invalid(parse("[worker]\npath = \":memory:\"\nqueue_size = 4\n"), "config parse error")
}

#[test]
fn parse_rejects_unknown_top_level_table() -> TestResult {
    assert_invalid(parse("[worker]\npath = \":memory:\"\n\n[server]\nport = 1\n"), "config parse error")
}

#[test]
fn parse_rejects_missing_path() -> TestResult {
    assert_invalid(parse("[worker]\nqueue_capacity = 4\n"), "config parse error")
}

#[test]
fn parse_rejects_unknown_journal_mode() -> TestResult {
    assert_invalid(
        parse("[worker]\npath = \":memory:\"\njournal_mode = \"truncate\"\n"),
        "config parse error",
    )
}

// ============================================================================
// SECTION: Value Validation
// ============================================================================

#[test]
fn parse_rejects_zero_queue_capacity() -> TestResult {
    assert_invalid(
        parse("[worker]\npath = \":memory:\"\nqueue_capacity = 0\n"),
        "queue_capacity must be greater than zero",
    )
}

#[test]
fn parse_rejects_zero_commit_batch_size() -> TestResult {
    assert_invalid(
        parse("[worker]\npath = \":memory:\"\ncommit_batch_size = 0\n"),
        "commit_batch_size must be greater than zero",
    )
}

#[test]
fn parse_rejects_blank_init_statement() -> TestResult {
    assert_invalid(
        parse("[worker]\npath = \":memory:\"\ninit_statements = [\"  \"]\n"),
        "init_statements must not contain blank statements",
    )
}

#[test]
fn parse_rejects_directory_database_path() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let content = format!("[worker]\npath = {:?}\n", dir.path().display().to_string());
    assert_invalid(parse(&content), "path must be a file, not a directory")
}
