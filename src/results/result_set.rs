use serde::Serialize;

use crate::error::EngineError;
use crate::types::{ColumnMetadata, ColumnValue};

/// Fully materialized query output, detached from the connection that produced it.
///
/// Every row holds exactly one cell per column, in column order. Rows keep the
/// order in which the store returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<ColumnValue>>,
}

impl QueryResult {
    #[must_use]
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row.
    ///
    /// # Errors
    /// Returns `EngineError::ExecutionError` if the row width differs from the column count.
    pub fn push_row(&mut self, row: Vec<ColumnValue>) -> Result<(), EngineError> {
        if row.len() != self.columns.len() {
            return Err(EngineError::ExecutionError(format!(
                "row has {} cells but result has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<ColumnValue>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column with this name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    /// Cell at `row` in the column called `column`.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&ColumnValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Every cell rendered to its canonical string form.
    #[must_use]
    pub fn rendered_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(ColumnValue::render).collect())
            .collect()
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<ColumnMetadata>, Vec<Vec<ColumnValue>>) {
        (self.columns, self.rows)
    }
}
