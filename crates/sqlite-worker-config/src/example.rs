// crates/sqlite-worker-config/src/example.rs
// ============================================================================
// Module: Config Example
// Description: Canonical example worker configuration.
// Purpose: Deterministic example for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `[worker]` configuration listing every key with its
//! default value. The example must always load cleanly.

/// Returns a canonical example worker configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[worker]
path = "data/worker.db"
queue_capacity = 100
init_statements = ["PRAGMA foreign_keys = ON"]
commit_batch_size = 50
auto_reconnect = true
max_retries = 3
retry_delay_ms = 1000
submit_timeout_ms = 5000
poll_interval_ms = 1000
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "full"
"#,
    )
}
