// crates/sqlite-worker/src/config.rs
// ============================================================================
// Module: Worker Configuration
// Description: Construction parameters for the single-writer engine.
// Purpose: Provide serde-loadable defaults and fail-closed validation.
// Dependencies: serde, crate::error
// ============================================================================

//! ## Overview
//! [`WorkerConfig`] carries everything `open` needs: storage location, queue
//! and batch sizing, reconnect policy, and connection pragmas. Defaults match
//! a conservative single-process deployment.
//!
//! Security posture: paths come from operator configuration; length and
//! component limits are enforced before any file is created.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::WorkerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Path value selecting a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Pragmas
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Rollback journal deleted after each transaction.
    Delete,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for one [`crate::SqliteWorker`].
///
/// # Invariants
/// - `path` is `:memory:` or resolves to a file path (not a directory).
/// - `queue_capacity`, `commit_batch_size`, and `poll_interval_ms` are
///   greater than zero.
/// - Durations are interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Database file path, or `:memory:`.
    pub path: PathBuf,
    /// Bounded request queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Statements replayed in order on every connection open.
    #[serde(default)]
    pub init_statements: Vec<String>,
    /// Statements executed per implicit commit batch.
    #[serde(default = "default_commit_batch_size")]
    pub commit_batch_size: usize,
    /// Reopen the connection after connection-level failures.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// Bound for reconnect attempts and busy/locked statement retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Sleep between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Submission deadline while the queue is full, in milliseconds.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
    /// Execution loop queue-wait timeout in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// `SQLite` busy handler timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: JournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SyncMode,
}

/// Default queue capacity.
const fn default_queue_capacity() -> usize {
    100
}

/// Default commit batch threshold.
const fn default_commit_batch_size() -> usize {
    50
}

/// Reconnect is enabled by default.
const fn default_auto_reconnect() -> bool {
    true
}

/// Default retry bound.
const fn default_max_retries() -> u32 {
    3
}

/// Default retry delay (ms).
const fn default_retry_delay_ms() -> u64 {
    1_000
}

/// Default submission deadline (ms).
const fn default_submit_timeout_ms() -> u64 {
    5_000
}

/// Default queue poll interval (ms).
const fn default_poll_interval_ms() -> u64 {
    1_000
}

/// Default busy timeout (ms).
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl WorkerConfig {
    /// Creates a configuration with default settings for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            queue_capacity: default_queue_capacity(),
            init_statements: Vec::new(),
            commit_batch_size: default_commit_batch_size(),
            auto_reconnect: default_auto_reconnect(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            submit_timeout_ms: default_submit_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
        }
    }

    /// Creates a configuration for a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    /// Returns `true` when the configuration selects an in-memory database.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    /// Returns the retry delay as a [`Duration`].
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns the submission deadline as a [`Duration`].
    #[must_use]
    pub const fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    /// Returns the queue poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the busy handler timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidConfig`] when a limit is zero, the path is
    /// unusable, or an init statement is blank.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if !self.is_memory() {
            validate_store_path(&self.path)?;
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be greater than zero"));
        }
        if self.commit_batch_size == 0 {
            return Err(invalid("commit_batch_size must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than zero"));
        }
        if self.init_statements.iter().any(|statement| statement.trim().is_empty()) {
            return Err(invalid("init_statements must not contain blank statements"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an [`WorkerError::InvalidConfig`] from a static message.
fn invalid(message: &str) -> WorkerError {
    WorkerError::InvalidConfig(message.to_string())
}

/// Validates database paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), WorkerError> {
    if path.as_os_str().is_empty() {
        return Err(invalid("path must not be empty"));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(invalid("path exceeds length limit"));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(invalid("path contains an overlong component"));
        }
    }
    if path.is_dir() {
        return Err(invalid("path must be a file, not a directory"));
    }
    Ok(())
}
