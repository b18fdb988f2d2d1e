use std::time::Duration;

use thiserror::Error;

/// Every failure the engine can surface to a caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    #[error("all {capacity} pooled connection(s) stayed checked out for {waited:?}")]
    PoolExhausted { capacity: u32, waited: Duration },

    #[error("connection pool has been closed")]
    PoolClosed,

    #[error("failed to open backing store at {path}: {source}")]
    ConnectFailed {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("statement failed: {source} (sql: {sql})")]
    StatementFailed {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The operation tried to begin, end, or nest a transaction itself.
    #[error("transaction control is managed by the engine (sql: {sql})")]
    TransactionControl { sql: String },

    #[error("failed to begin transaction: {0}")]
    BeginFailed(#[source] rusqlite::Error),

    #[error("failed to commit transaction: {0}")]
    CommitFailed(#[source] rusqlite::Error),

    /// The operation failed and the rollback that followed failed as well.
    #[error("{cause}; rollback also failed: {source}")]
    RollbackFailed {
        cause: Box<EngineError>,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl EngineError {
    pub(crate) fn statement(sql: &str, source: rusqlite::Error) -> Self {
        EngineError::StatementFailed {
            sql: sql.to_owned(),
            source,
        }
    }

    /// The error that started the failure, skipping a composite rollback wrapper.
    #[must_use]
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::RollbackFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
