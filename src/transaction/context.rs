use rusqlite::fallible_iterator::FallibleIterator as _;

use crate::error::EngineError;
use crate::results::{QueryResult, materialize};

/// Leading keywords of statements that open, end, or nest transactions.
const TRANSACTION_CONTROL: &[&str] = &[
    "BEGIN",
    "COMMIT",
    "END",
    "ROLLBACK",
    "SAVEPOINT",
    "RELEASE",
];

/// First keyword of `sql`, skipping whitespace and comments.
fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

fn reject_transaction_control(sql: &str) -> Result<(), EngineError> {
    let keyword = leading_keyword(sql);
    if TRANSACTION_CONTROL
        .iter()
        .any(|control| keyword.eq_ignore_ascii_case(control))
    {
        return Err(EngineError::TransactionControl {
            sql: sql.trim().to_owned(),
        });
    }
    Ok(())
}

/// Statement surface handed to an operation running inside a transaction.
///
/// Everything issued through the context belongs to the same transaction and
/// is committed or rolled back as a unit once the operation returns. Statements
/// that would begin, end, or nest a transaction are rejected with
/// `EngineError::TransactionControl`.
pub struct TxContext<'c> {
    conn: &'c rusqlite::Connection,
}

impl<'c> TxContext<'c> {
    pub(crate) fn new(conn: &'c rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Run a single statement. Rows it produces are read and discarded.
    ///
    /// Returns `true` once the statement has run to completion.
    ///
    /// # Errors
    /// Returns `EngineError::StatementFailed` if the statement is rejected or fails.
    pub fn execute(&mut self, sql: &str) -> Result<bool, EngineError> {
        reject_transaction_control(sql)?;
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| EngineError::statement(sql, e))?;
        if stmt.column_count() > 0 {
            let mut rows = stmt.query([]).map_err(|e| EngineError::statement(sql, e))?;
            while rows
                .next()
                .map_err(|e| EngineError::statement(sql, e))?
                .is_some()
            {}
        } else {
            stmt.execute([]).map_err(|e| EngineError::statement(sql, e))?;
        }
        Ok(true)
    }

    /// Run a single DML statement and return the number of rows it changed.
    ///
    /// # Errors
    /// Returns `EngineError::StatementFailed` if the statement is rejected or fails.
    pub fn execute_dml(&mut self, sql: &str) -> Result<usize, EngineError> {
        reject_transaction_control(sql)?;
        self.conn
            .execute(sql, [])
            .map_err(|e| EngineError::statement(sql, e))
    }

    /// Run several `;`-separated statements, one after another.
    ///
    /// Each statement is prepared only once the previous one has run, so later
    /// statements may use tables created earlier in the batch.
    ///
    /// # Errors
    /// Returns `EngineError::StatementFailed` at the first statement that fails,
    /// or `EngineError::TransactionControl` for a statement that would end the transaction.
    pub fn execute_batch(&mut self, sql: &str) -> Result<(), EngineError> {
        let mut batch = rusqlite::Batch::new(self.conn, sql);
        while let Some(mut stmt) = batch.next().map_err(|e| EngineError::statement(sql, e))? {
            let text = stmt.expanded_sql().unwrap_or_default();
            reject_transaction_control(&text)?;
            if stmt.column_count() > 0 {
                let mut rows = stmt.query([]).map_err(|e| EngineError::statement(&text, e))?;
                while rows
                    .next()
                    .map_err(|e| EngineError::statement(&text, e))?
                    .is_some()
                {}
            } else {
                stmt.execute([])
                    .map_err(|e| EngineError::statement(&text, e))?;
            }
        }
        Ok(())
    }

    /// Run a query and copy its full result out of the cursor.
    ///
    /// # Errors
    /// Returns `EngineError::StatementFailed` if preparing or stepping the query fails.
    pub fn query(&mut self, sql: &str) -> Result<QueryResult, EngineError> {
        reject_transaction_control(sql)?;
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| EngineError::statement(sql, e))?;
        materialize(&mut stmt).map_err(|err| match err {
            EngineError::SqliteError(source) => EngineError::statement(sql, source),
            other => other,
        })
    }

    /// Run a single-row query and map the row with `f`.
    ///
    /// # Errors
    /// Returns `EngineError::StatementFailed` if the query fails or yields no row.
    pub fn query_row<T, F>(&mut self, sql: &str, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        reject_transaction_control(sql)?;
        self.conn
            .query_row(sql, [], f)
            .map_err(|e| EngineError::statement(sql, e))
    }
}
