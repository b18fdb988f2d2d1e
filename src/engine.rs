use crate::error::EngineError;
use crate::pool::{ConnectionPool, PoolStatus};
use crate::results::QueryResult;
use crate::sqlite::{EngineOptions, EngineOptionsBuilder};
use crate::transaction::{TransactionExecutor, TxContext};

/// Process-wide handle to one file-backed store.
///
/// Every call runs in its own transaction on the pool's single connection, so
/// concurrent callers are served one at a time.
/// ```rust,no_run
/// use sqlite_tx_engine::prelude::*;
///
/// # async fn demo() -> Result<(), EngineError> {
/// let engine = Engine::new("app.db").await?;
/// engine.execute("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY, name TEXT)").await?;
/// engine.execute("INSERT INTO t (name) VALUES ('alice')").await?;
/// let result = engine.query("SELECT id, name FROM t").await?;
/// assert_eq!(result.rendered_rows(), vec![vec!["1", "alice"]]);
/// engine.close();
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Engine {
    pool: ConnectionPool,
    db_path: String,
}

impl Engine {
    /// Create an engine with default pool settings. The store is not opened until first use.
    ///
    /// # Errors
    /// Returns `EngineError::ConfigError` if `path` is empty.
    pub async fn new(path: impl Into<String>) -> Result<Self, EngineError> {
        Self::with_options(EngineOptions::new(path)).await
    }

    #[must_use]
    pub fn builder(path: impl Into<String>) -> EngineOptionsBuilder {
        EngineOptionsBuilder::new(path)
    }

    /// # Errors
    /// Returns `EngineError::ConfigError` if the options are invalid.
    #[allow(clippy::unused_async)]
    pub async fn with_options(opts: EngineOptions) -> Result<Self, EngineError> {
        let pool = ConnectionPool::new(&opts)?;
        Ok(Self {
            pool,
            db_path: opts.db_path,
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn executor(&self) -> TransactionExecutor<'_> {
        TransactionExecutor::new(&self.pool)
    }

    /// Run one statement in its own transaction.
    ///
    /// # Errors
    /// Returns the pool's error if no connection is available,
    /// `TransactionControl` for `BEGIN`/`COMMIT`/`ROLLBACK` and friends, or
    /// `StatementFailed` if the statement fails (nothing is written).
    pub async fn execute(&self, sql: &str) -> Result<bool, EngineError> {
        let sql = sql.to_owned();
        self.executor()
            .run_in_transaction(move |tx| tx.execute(&sql))
            .await
    }

    /// Run several `;`-separated statements atomically.
    ///
    /// # Errors
    /// Returns `StatementFailed` for the first failing statement; earlier ones are rolled back.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), EngineError> {
        let sql = sql.to_owned();
        self.executor()
            .run_in_transaction(move |tx| tx.execute_batch(&sql))
            .await
    }

    /// Run a query in its own transaction and return the materialized result.
    ///
    /// # Errors
    /// Returns the pool's error if no connection is available, or
    /// `StatementFailed` if the query is rejected.
    pub async fn query(&self, sql: &str) -> Result<QueryResult, EngineError> {
        let sql = sql.to_owned();
        self.executor()
            .run_in_transaction(move |tx| tx.query(&sql))
            .await
    }

    /// Run a caller-supplied unit of work in one transaction.
    ///
    /// If the returned future is dropped while the work is running, the work
    /// still finishes on its blocking thread but is rolled back, and the
    /// connection is not handed to anyone else until then.
    ///
    /// # Errors
    /// Returns the operation's error after rolling back everything it did.
    pub async fn transaction<F, T>(&self, op: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut TxContext<'_>) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        self.executor().run_in_transaction(op).await
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Shut the pool down. Later calls fail with `EngineError::PoolClosed`.
    pub fn close(&self) {
        self.pool.close();
    }
}
