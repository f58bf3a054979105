// crates/sqlite-worker/src/identifier.rs
// ============================================================================
// Module: Identifier Validation
// Description: Guards for table/column names interpolated into statement text.
// Purpose: Reject unsafe identifiers before any request reaches the queue.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! Parameter values are always bound, never interpolated. Identifiers cannot be
//! bound, so every table name, column name, and `order_by` term accepted by the
//! convenience builders is checked here first.
//!
//! Accepted identifier production: a letter or underscore followed by letters,
//! digits, or underscores (ASCII only).
//!
//! Security posture: this is the only defense against SQL injection through
//! identifiers; callers must not bypass it when building statement text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::error::WorkerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum identifier length accepted by the validator.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

// ============================================================================
// SECTION: Identifier Validation
// ============================================================================

/// Returns `true` when `identifier` matches `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_valid_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    identifier.len() <= MAX_IDENTIFIER_LENGTH
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Validates a table or column identifier.
///
/// # Errors
///
/// Returns [`WorkerError::InvalidIdentifier`] when the identifier is empty,
/// too long, or contains characters outside the accepted production.
pub fn validate_identifier(identifier: &str) -> Result<(), WorkerError> {
    if is_valid_identifier(identifier) {
        Ok(())
    } else {
        Err(WorkerError::InvalidIdentifier(identifier.to_string()))
    }
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Sort direction for an `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// Returns the SQL keyword for the direction.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One validated `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    /// Validated column identifier.
    pub column: String,
    /// Explicit direction, when the caller supplied one.
    pub direction: Option<SortDirection>,
}

/// Parses an `order_by` clause such as `"age DESC, name"`.
///
/// Each comma-separated term must be a valid identifier optionally followed by
/// `ASC` or `DESC` (case-insensitive). Nothing else is accepted.
///
/// # Errors
///
/// Returns [`WorkerError::InvalidIdentifier`] when a term's column fails
/// validation and [`WorkerError::InvalidArgument`] for any other malformed term.
pub fn parse_order_by(clause: &str) -> Result<Vec<OrderTerm>, WorkerError> {
    if clause.trim().is_empty() {
        return Err(WorkerError::InvalidArgument("order_by must not be empty".to_string()));
    }
    let mut terms = Vec::new();
    for raw_term in clause.split(',') {
        let mut words = raw_term.split_whitespace();
        let Some(column) = words.next() else {
            return Err(WorkerError::InvalidArgument(
                "order_by contains an empty term".to_string(),
            ));
        };
        validate_identifier(column)?;
        let direction = match words.next() {
            None => None,
            Some(word) if word.eq_ignore_ascii_case("asc") => Some(SortDirection::Asc),
            Some(word) if word.eq_ignore_ascii_case("desc") => Some(SortDirection::Desc),
            Some(_) => {
                return Err(WorkerError::InvalidArgument(format!(
                    "order_by direction for {column} must be ASC or DESC"
                )));
            }
        };
        if words.next().is_some() {
            return Err(WorkerError::InvalidArgument(format!(
                "order_by term for {column} has trailing tokens"
            )));
        }
        terms.push(OrderTerm {
            column: column.to_string(),
            direction,
        });
    }
    Ok(terms)
}

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Converts a row limit into the signed form bound into `LIMIT ?`.
///
/// # Errors
///
/// Returns [`WorkerError::InvalidArgument`] when the limit exceeds `i64::MAX`.
pub fn checked_limit(limit: u64) -> Result<i64, WorkerError> {
    i64::try_from(limit)
        .map_err(|_| WorkerError::InvalidArgument(format!("limit out of range: {limit}")))
}

#[cfg(test)]
mod tests;
