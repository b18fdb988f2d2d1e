use std::fmt;

use serde::{Deserialize, Serialize};

/// A single materialized cell.
///
/// Exactly one variant is active per cell. Absent values are always `Null`,
/// whatever the column's declared type.
/// ```rust
/// use sqlite_tx_engine::prelude::*;
///
/// assert_eq!(ColumnValue::Integer(42).render(), "42");
/// assert_eq!(ColumnValue::Real(30.0).render(), "30.0");
/// assert_eq!(ColumnValue::Null.render(), "null");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ColumnValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Null,
}

/// Discriminant of a [`ColumnValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Integer,
    Real,
    Boolean,
    Null,
}

impl ColumnValue {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            ColumnValue::Text(_) => ValueKind::Text,
            ColumnValue::Integer(_) => ValueKind::Integer,
            ColumnValue::Real(_) => ValueKind::Real,
            ColumnValue::Boolean(_) => ValueKind::Boolean,
            ColumnValue::Null => ValueKind::Null,
        }
    }

    /// Canonical string form of the cell.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            ColumnValue::Text(s) => s.clone(),
            ColumnValue::Integer(i) => i.to_string(),
            ColumnValue::Real(f) => render_real(*f),
            ColumnValue::Boolean(b) => b.to_string(),
            ColumnValue::Null => "null".to_string(),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let ColumnValue::Integer(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let ColumnValue::Real(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let ColumnValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let ColumnValue::Boolean(value) = self {
            Some(*value)
        } else {
            None
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// Debug formatting is the shortest round-trip form and keeps ".0" on integral values.
fn render_real(value: f64) -> String {
    format!("{value:?}")
}

/// Column description taken from the statement before any row is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    /// Declared type as written in the schema; empty for expression columns.
    pub type_name: String,
    pub is_nullable: bool,
}

impl ColumnMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_nullable,
        }
    }
}

/// Target variant selected by a column's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    Integer,
    Real,
    Boolean,
    Text,
    /// Unrecognized name; cells are rendered as text.
    Other,
    /// No declared type; cells follow their storage class.
    Untyped,
}

/// Declared type names that map to a specific variant. Anything else is `Other`.
const DECLARED_TYPES: &[(&str, DeclaredType)] = &[
    ("INTEGER", DeclaredType::Integer),
    ("REAL", DeclaredType::Real),
    ("BOOLEAN", DeclaredType::Boolean),
    ("TEXT", DeclaredType::Text),
    ("VARCHAR", DeclaredType::Text),
    ("CHAR", DeclaredType::Text),
];

impl DeclaredType {
    /// Case-insensitive lookup; a size suffix such as `(255)` is ignored.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let base = name.split('(').next().unwrap_or_default().trim();
        if base.is_empty() {
            return DeclaredType::Untyped;
        }
        DECLARED_TYPES
            .iter()
            .find(|(declared, _)| declared.eq_ignore_ascii_case(base))
            .map_or(DeclaredType::Other, |(_, ty)| *ty)
    }
}
