// crates/sqlite-worker/src/builder.rs
// ============================================================================
// Module: Statement Builders
// Description: Insert/update/delete/select text assembly over validated names.
// Purpose: Offer CRUD helpers without interpolating any caller value.
// Dependencies: rusqlite, crate::identifier
// ============================================================================

//! ## Overview
//! Builders validate every identifier, quote it, and bind every value as a
//! positional `?` parameter. Conditions are equality-only and joined with
//! `AND`; anything richer goes through `execute` with hand-written text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;

use rusqlite::types::Value;

use crate::error::WorkerError;
use crate::identifier::checked_limit;
use crate::identifier::parse_order_by;
use crate::identifier::validate_identifier;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Statement text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltStatement {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Value>,
}

/// Builder for the `select` convenience operation.
///
/// # Invariants
/// - Nothing is validated until the query is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Table name.
    table: String,
    /// Selected columns; empty selects `*`.
    columns: Vec<String>,
    /// Equality conditions joined with `AND`.
    filters: Vec<(String, Value)>,
    /// Raw `order_by` clause, validated at build time.
    order_by: Option<String>,
    /// Maximum rows returned.
    limit: Option<u64>,
}

impl SelectQuery {
    /// Starts a `SELECT *` over `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Restricts the selected columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    /// Sets the ordering, e.g. `"age DESC, name"`.
    #[must_use]
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    /// Caps the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Validates the query and assembles its statement.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidIdentifier`] or
    /// [`WorkerError::InvalidArgument`] for unsafe names, malformed ordering,
    /// or an out-of-range limit.
    pub fn build(&self) -> Result<BuiltStatement, WorkerError> {
        validate_identifier(&self.table)?;
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            quoted_list(self.columns.iter().map(String::as_str))?
        };
        let mut sql = format!("SELECT {columns} FROM {}", quote(&self.table));
        let mut params = Vec::new();
        if !self.filters.is_empty() {
            let (clause, values) = where_clause(self.filters.iter().map(|(k, v)| (k.as_str(), v)))?;
            sql.push_str(&clause);
            params.extend(values);
        }
        if let Some(order_by) = &self.order_by {
            let terms = parse_order_by(order_by)?
                .into_iter()
                .map(|term| match term.direction {
                    Some(direction) => format!("{} {}", quote(&term.column), direction.as_sql()),
                    None => quote(&term.column),
                })
                .collect::<Vec<_>>();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(checked_limit(limit)?));
        }
        Ok(BuiltStatement {
            sql,
            params,
        })
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Builds `INSERT INTO table (cols) VALUES (?, ...)`.
///
/// # Errors
///
/// Returns [`WorkerError::InvalidArgument`] for an empty or duplicated column
/// list and [`WorkerError::InvalidIdentifier`] for unsafe names.
pub fn build_insert(table: &str, values: &[(&str, Value)]) -> Result<BuiltStatement, WorkerError> {
    validate_identifier(table)?;
    if values.is_empty() {
        return Err(WorkerError::InvalidArgument("insert requires at least one column".to_string()));
    }
    let columns = quoted_list(values.iter().map(|(column, _)| *column))?;
    let placeholders = vec!["?"; values.len()].join(", ");
    Ok(BuiltStatement {
        sql: format!("INSERT INTO {} ({columns}) VALUES ({placeholders})", quote(table)),
        params: values.iter().map(|(_, value)| value.clone()).collect(),
    })
}

/// Builds `UPDATE table SET col = ? ... WHERE cond = ? AND ...`.
///
/// # Errors
///
/// Returns [`WorkerError::InvalidArgument`] when either map is empty and
/// [`WorkerError::InvalidIdentifier`] for unsafe names.
pub fn build_update(
    table: &str,
    values: &[(&str, Value)],
    conditions: &[(&str, Value)],
) -> Result<BuiltStatement, WorkerError> {
    validate_identifier(table)?;
    if values.is_empty() {
        return Err(WorkerError::InvalidArgument("update requires at least one column".to_string()));
    }
    if conditions.is_empty() {
        return Err(WorkerError::InvalidArgument("update requires at least one condition".to_string()));
    }
    ensure_unique(values.iter().map(|(column, _)| *column))?;
    let mut assignments = Vec::with_capacity(values.len());
    for (column, _) in values {
        validate_identifier(column)?;
        assignments.push(format!("{} = ?", quote(column)));
    }
    let (clause, condition_values) =
        where_clause(conditions.iter().map(|(column, value)| (*column, value)))?;
    let mut params: Vec<Value> = values.iter().map(|(_, value)| value.clone()).collect();
    params.extend(condition_values);
    Ok(BuiltStatement {
        sql: format!("UPDATE {} SET {}{clause}", quote(table), assignments.join(", ")),
        params,
    })
}

/// Builds `DELETE FROM table WHERE cond = ? AND ...`.
///
/// # Errors
///
/// Returns [`WorkerError::InvalidArgument`] when no condition is given and
/// [`WorkerError::InvalidIdentifier`] for unsafe names.
pub fn build_delete(table: &str, conditions: &[(&str, Value)]) -> Result<BuiltStatement, WorkerError> {
    validate_identifier(table)?;
    if conditions.is_empty() {
        return Err(WorkerError::InvalidArgument("delete requires at least one condition".to_string()));
    }
    let (clause, params) = where_clause(conditions.iter().map(|(column, value)| (*column, value)))?;
    Ok(BuiltStatement {
        sql: format!("DELETE FROM {}{clause}", quote(table)),
        params,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Wraps a validated identifier in double quotes.
fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

/// Validates, de-duplicates, and quotes a column list.
fn quoted_list<'a>(columns: impl Iterator<Item = &'a str> + Clone) -> Result<String, WorkerError> {
    ensure_unique(columns.clone())?;
    let mut quoted = Vec::new();
    for column in columns {
        validate_identifier(column)?;
        quoted.push(quote(column));
    }
    Ok(quoted.join(", "))
}

/// Rejects repeated column names.
fn ensure_unique<'a>(columns: impl Iterator<Item = &'a str>) -> Result<(), WorkerError> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column) {
            return Err(WorkerError::InvalidArgument(format!("duplicate column: {column}")));
        }
    }
    Ok(())
}

/// Builds ` WHERE a = ? AND b = ?` and its parameters.
fn where_clause<'a>(
    conditions: impl Iterator<Item = (&'a str, &'a Value)>,
) -> Result<(String, Vec<Value>), WorkerError> {
    let mut terms = Vec::new();
    let mut params = Vec::new();
    for (column, value) in conditions {
        validate_identifier(column)?;
        terms.push(format!("{} = ?", quote(column)));
        params.push(value.clone());
    }
    Ok((format!(" WHERE {}", terms.join(" AND ")), params))
}
