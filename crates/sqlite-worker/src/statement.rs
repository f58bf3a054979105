// crates/sqlite-worker/src/statement.rs
// ============================================================================
// Module: Statement Classification
// Description: Leading-keyword classification of statement text.
// Purpose: Drive hook routing, read auto-tokens, and commit batching.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Statements are classified by their first keyword after leading whitespace,
//! compared case-insensitively. Classification never parses beyond that word.

// ============================================================================
// SECTION: Types
// ============================================================================

/// Coarse statement kind derived from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// `SELECT ...`
    Select,
    /// `INSERT ...` or `REPLACE ...`
    Insert,
    /// `UPDATE ...`
    Update,
    /// `DELETE ...`
    Delete,
    /// `BEGIN`, `COMMIT`, `END`, `ROLLBACK`, `SAVEPOINT`, `RELEASE`
    TransactionControl,
    /// Any other statement (DDL, pragmas, `WITH` queries, ...).
    Other,
}

impl StatementKind {
    /// Classifies `statement` by its leading keyword.
    #[must_use]
    pub fn classify(statement: &str) -> Self {
        let keyword = statement
            .trim_start()
            .split(|ch: char| !ch.is_ascii_alphabetic())
            .next()
            .unwrap_or_default();
        let matches = |candidate: &str| keyword.eq_ignore_ascii_case(candidate);
        if matches("select") {
            Self::Select
        } else if matches("insert") || matches("replace") {
            Self::Insert
        } else if matches("update") {
            Self::Update
        } else if matches("delete") {
            Self::Delete
        } else if ["begin", "commit", "end", "rollback", "savepoint", "release"]
            .into_iter()
            .any(matches)
        {
            Self::TransactionControl
        } else {
            Self::Other
        }
    }

    /// Returns `true` for read queries, which always receive a token.
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Select)
    }
}

#[cfg(test)]
mod tests {
    //! Leading-keyword classification cases.

    use super::StatementKind;

    #[test]
    fn classifies_case_insensitively_after_whitespace() {
        assert_eq!(StatementKind::classify("  \n\tselect * from t"), StatementKind::Select);
        assert_eq!(StatementKind::classify("InSeRt INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(StatementKind::classify("REPLACE INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(StatementKind::classify("update t set a = 1"), StatementKind::Update);
        assert_eq!(StatementKind::classify("DELETE FROM t"), StatementKind::Delete);
    }

    #[test]
    fn classifies_transaction_control() {
        for sql in ["BEGIN", "begin immediate", "COMMIT", "END", "rollback", "SAVEPOINT a"] {
            assert_eq!(StatementKind::classify(sql), StatementKind::TransactionControl);
        }
    }

    #[test]
    fn keyword_must_be_a_whole_word() {
        assert_eq!(StatementKind::classify("SELECT(1)"), StatementKind::Select);
        assert_eq!(StatementKind::classify("selection"), StatementKind::Other);
        assert_eq!(StatementKind::classify("ENDING"), StatementKind::Other);
        assert_eq!(StatementKind::classify(""), StatementKind::Other);
        assert_eq!(StatementKind::classify("CREATE TABLE t(id)"), StatementKind::Other);
    }

    #[test]
    fn only_select_is_read() {
        assert!(StatementKind::Select.is_read());
        assert!(!StatementKind::Insert.is_read());
        assert!(!StatementKind::Other.is_read());
    }
}
