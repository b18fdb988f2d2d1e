use rusqlite::Statement;
use rusqlite::types::ValueRef;

use crate::error::EngineError;
use crate::results::QueryResult;
use crate::types::{ColumnMetadata, ColumnValue, DeclaredType};

/// Describe every result column, left to right.
///
/// A column read straight from a table is nullable unless its schema column is
/// `NOT NULL` or part of the primary key. Columns without a table origin
/// (expressions, literals, aggregates) have an empty declared type and are
/// reported nullable.
///
/// # Errors
/// Returns `EngineError::SqliteError` if the column's table metadata cannot be read.
pub fn read_metadata(stmt: &Statement<'_>) -> Result<Vec<ColumnMetadata>, EngineError> {
    let mut metadata = Vec::with_capacity(stmt.column_count());
    for (idx, column) in stmt.columns().iter().enumerate() {
        let is_nullable = match stmt.column_metadata(idx)? {
            Some((_, _, _, _, _, not_null, primary_key, _)) => !(not_null || primary_key),
            None => true,
        };
        metadata.push(ColumnMetadata::new(
            column.name(),
            column.decl_type().unwrap_or_default(),
            is_nullable,
        ));
    }
    Ok(metadata)
}

/// The store's own string rendering of a cell.
fn render_store(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "null".to_string(),
        ValueRef::Integer(i) => ColumnValue::Integer(i).render(),
        ValueRef::Real(f) => ColumnValue::Real(f).render(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn text_of(value: ValueRef<'_>) -> Option<&str> {
    match value {
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().map(str::trim),
        _ => None,
    }
}

fn coerce_integer(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(i) => Some(i),
        #[allow(clippy::cast_possible_truncation)]
        ValueRef::Real(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Some(f as i64)
        }
        ValueRef::Text(_) => text_of(value)?.parse().ok(),
        _ => None,
    }
}

fn coerce_real(value: ValueRef<'_>) -> Option<f64> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(_) => text_of(value)?.parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: ValueRef<'_>) -> Option<bool> {
    match value {
        ValueRef::Integer(i) => Some(i != 0),
        ValueRef::Real(f) => Some(f != 0.0),
        ValueRef::Text(_) => {
            let text = text_of(value)?;
            if text.eq_ignore_ascii_case("true") || text == "1" {
                Some(true)
            } else if text.eq_ignore_ascii_case("false") || text == "0" {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Convert one cell according to its column's declared type.
///
/// Absent cells are `Null` whatever the declared type. A cell whose stored value
/// cannot be read as the declared variant keeps the store's rendering as `Text`.
#[must_use]
pub fn read_value(value: ValueRef<'_>, declared: DeclaredType) -> ColumnValue {
    if matches!(value, ValueRef::Null) {
        return ColumnValue::Null;
    }
    match declared {
        DeclaredType::Integer => coerce_integer(value)
            .map_or_else(|| ColumnValue::Text(render_store(value)), ColumnValue::Integer),
        DeclaredType::Real => coerce_real(value)
            .map_or_else(|| ColumnValue::Text(render_store(value)), ColumnValue::Real),
        DeclaredType::Boolean => coerce_bool(value)
            .map_or_else(|| ColumnValue::Text(render_store(value)), ColumnValue::Boolean),
        DeclaredType::Text | DeclaredType::Other => ColumnValue::Text(render_store(value)),
        DeclaredType::Untyped => match value {
            ValueRef::Integer(i) => ColumnValue::Integer(i),
            ValueRef::Real(f) => ColumnValue::Real(f),
            _ => ColumnValue::Text(render_store(value)),
        },
    }
}

/// Copy every row out of `stmt` into an owned [`QueryResult`].
///
/// Runs to completion before returning, so the result stays valid after the
/// transaction that produced it has ended.
///
/// # Errors
/// Returns `EngineError::SqliteError` if reading metadata or stepping the cursor fails.
pub fn materialize(stmt: &mut Statement<'_>) -> Result<QueryResult, EngineError> {
    let columns = read_metadata(stmt)?;
    let declared: Vec<DeclaredType> = columns
        .iter()
        .map(|col| DeclaredType::from_name(&col.type_name))
        .collect();

    let mut result = QueryResult::new(columns);
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(declared.len());
        for (idx, ty) in declared.iter().enumerate() {
            cells.push(read_value(row.get_ref(idx)?, *ty));
        }
        result.push_row(cells)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn null_wins_over_declared_type() {
        for ty in [
            DeclaredType::Integer,
            DeclaredType::Real,
            DeclaredType::Boolean,
            DeclaredType::Text,
            DeclaredType::Other,
            DeclaredType::Untyped,
        ] {
            assert_eq!(read_value(ValueRef::Null, ty), ColumnValue::Null);
        }
    }

    #[test]
    fn declared_type_selects_variant() {
        assert_eq!(
            read_value(ValueRef::Integer(42), DeclaredType::Integer),
            ColumnValue::Integer(42)
        );
        assert_eq!(
            read_value(ValueRef::Integer(3), DeclaredType::Real),
            ColumnValue::Real(3.0)
        );
        assert_eq!(
            read_value(ValueRef::Integer(1), DeclaredType::Boolean),
            ColumnValue::Boolean(true)
        );
        assert_eq!(
            read_value(ValueRef::Text(b"false"), DeclaredType::Boolean),
            ColumnValue::Boolean(false)
        );
        assert_eq!(
            read_value(ValueRef::Integer(7), DeclaredType::Text),
            ColumnValue::Text("7".into())
        );
        assert_eq!(
            read_value(ValueRef::Real(1.5), DeclaredType::Other),
            ColumnValue::Text("1.5".into())
        );
    }

    #[test]
    fn mismatched_storage_falls_back_to_text() {
        assert_eq!(
            read_value(ValueRef::Text(b"abc"), DeclaredType::Integer),
            ColumnValue::Text("abc".into())
        );
        assert_eq!(
            read_value(ValueRef::Real(2.5), DeclaredType::Integer),
            ColumnValue::Text("2.5".into())
        );
        assert_eq!(
            read_value(ValueRef::Text(b"maybe"), DeclaredType::Boolean),
            ColumnValue::Text("maybe".into())
        );
    }

    #[test]
    fn untyped_columns_follow_storage_class() {
        assert_eq!(
            read_value(ValueRef::Integer(3), DeclaredType::Untyped),
            ColumnValue::Integer(3)
        );
        assert_eq!(
            read_value(ValueRef::Real(30.0), DeclaredType::Untyped),
            ColumnValue::Real(30.0)
        );
        assert_eq!(
            read_value(ValueRef::Blob(b"raw"), DeclaredType::Untyped),
            ColumnValue::Text("raw".into())
        );
    }

    #[test]
    fn materializes_rows_in_store_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE p (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, active BOOLEAN);
             INSERT INTO p VALUES (1, 'a', 1.5, 1), (2, 'b', NULL, 0);",
        )
        .unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, score, active, id * 2 AS twice FROM p ORDER BY id")
            .unwrap();
        let result = materialize(&mut stmt).unwrap();

        let nullable: Vec<bool> = result.columns().iter().map(|c| c.is_nullable).collect();
        assert_eq!(nullable, vec![false, false, true, true, true]);
        assert_eq!(result.columns()[4].type_name, "");
        assert_eq!(
            result.rendered_rows(),
            vec![
                vec!["1", "a", "1.5", "true", "2"],
                vec!["2", "b", "null", "false", "4"],
            ]
        );
    }

    #[test]
    fn nullability_follows_origin_column_through_joins_and_aliases() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE team (id INTEGER PRIMARY KEY, label VARCHAR(20) NOT NULL);
             CREATE TABLE member (id INTEGER PRIMARY KEY, team_id INTEGER, nick TEXT);
             INSERT INTO team VALUES (1, 'core');
             INSERT INTO member VALUES (10, 1, NULL);",
        )
        .unwrap();
        let stmt = conn
            .prepare(
                "SELECT m.nick AS handle, t.label, m.team_id, m.id + 1 AS next_id
                 FROM member m JOIN team t ON t.id = m.team_id",
            )
            .unwrap();
        let columns = read_metadata(&stmt).unwrap();

        assert_eq!(
            columns,
            vec![
                ColumnMetadata::new("handle", "TEXT", true),
                ColumnMetadata::new("label", "VARCHAR(20)", false),
                ColumnMetadata::new("team_id", "INTEGER", true),
                ColumnMetadata::new("next_id", "", true),
            ]
        );
    }
}
