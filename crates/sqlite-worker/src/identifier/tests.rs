// crates/sqlite-worker/src/identifier/tests.rs
// ============================================================================
// Module: Identifier Validation Unit Tests
// Description: Accept/reject cases for identifiers, ordering, and limits.
// Purpose: Pin the identifier production used by every statement builder.
// Dependencies: sqlite-worker
// ============================================================================

//! ## Overview
//! Unit tests for identifier validation edge cases.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions are permitted."
)]

use super::MAX_IDENTIFIER_LENGTH;
use super::SortDirection;
use super::checked_limit;
use super::is_valid_identifier;
use super::parse_order_by;
use super::validate_identifier;
use crate::error::WorkerError;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

#[test]
fn accepts_letters_digits_and_underscores() {
    for name in ["users", "_private", "Table_2", "a", "_", "snake_case_name"] {
        assert!(is_valid_identifier(name), "{name} should be accepted");
    }
}

#[test]
fn rejects_injection_and_punctuation() {
    for name in [
        "",
        "1users",
        "users; DROP TABLE users; --",
        "name;DROP",
        "first name",
        "t.col",
        "col\"",
        "naïve",
        "a-b",
    ] {
        assert!(!is_valid_identifier(name), "{name} should be rejected");
    }
}

#[test]
fn rejects_overlong_identifier() {
    let at_limit = "a".repeat(MAX_IDENTIFIER_LENGTH);
    let over_limit = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
    assert!(is_valid_identifier(&at_limit));
    assert!(!is_valid_identifier(&over_limit));
}

#[test]
fn validate_identifier_reports_offending_name() {
    let err = validate_identifier("bad name").unwrap_err();
    assert_eq!(err, WorkerError::InvalidIdentifier("bad name".to_string()));
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

#[test]
fn order_by_accepts_column_and_direction() {
    let terms = parse_order_by("age DESC, name asc, id").unwrap();
    assert_eq!(terms.len(), 3);
    assert_eq!(terms[0].column, "age");
    assert_eq!(terms[0].direction, Some(SortDirection::Desc));
    assert_eq!(terms[1].direction, Some(SortDirection::Asc));
    assert_eq!(terms[2].direction, None);
}

#[test]
fn order_by_rejects_injected_statement() {
    let err = parse_order_by("name; DROP TABLE test_table").unwrap_err();
    assert!(matches!(err, WorkerError::InvalidIdentifier(_)));
}

#[test]
fn order_by_rejects_unknown_direction_and_trailing_tokens() {
    assert!(matches!(
        parse_order_by("name SIDEWAYS").unwrap_err(),
        WorkerError::InvalidArgument(_)
    ));
    assert!(matches!(
        parse_order_by("name ASC NULLS").unwrap_err(),
        WorkerError::InvalidArgument(_)
    ));
    assert!(matches!(parse_order_by("name,").unwrap_err(), WorkerError::InvalidArgument(_)));
    assert!(matches!(parse_order_by("  ").unwrap_err(), WorkerError::InvalidArgument(_)));
}

// ============================================================================
// SECTION: Limits
// ============================================================================

#[test]
fn checked_limit_bounds() {
    assert_eq!(checked_limit(0).unwrap(), 0);
    assert_eq!(checked_limit(10).unwrap(), 10);
    assert!(checked_limit(u64::MAX).is_err());
}
