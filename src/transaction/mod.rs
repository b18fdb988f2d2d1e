mod context;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub use context::TxContext;

use crate::error::EngineError;
use crate::pool::ConnectionPool;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

#[cfg(test)]
thread_local! {
    static FORCED_ROLLBACK_BUSY: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Make the next `attempts` ROLLBACKs issued on this thread report `SQLITE_BUSY`.
#[cfg(test)]
pub(crate) fn force_rollback_busy_for_tests(attempts: usize) {
    FORCED_ROLLBACK_BUSY.set(attempts);
}

#[cfg(test)]
fn forced_rollback_busy() -> Option<rusqlite::Error> {
    let remaining = FORCED_ROLLBACK_BUSY.get();
    if remaining == 0 {
        return None;
    }
    FORCED_ROLLBACK_BUSY.set(remaining - 1);
    Some(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        None,
    ))
}

#[cfg(not(test))]
fn forced_rollback_busy() -> Option<rusqlite::Error> {
    None
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::DatabaseBusy
    )
}

fn rollback_once(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    if let Some(err) = forced_rollback_busy() {
        return Err(err);
    }
    conn.execute_batch("ROLLBACK")
}

pub(crate) fn rollback_with_busy_retries(
    conn: &rusqlite::Connection,
) -> Result<(), rusqlite::Error> {
    let mut delays = ROLLBACK_BUSY_RETRIES.iter();
    loop {
        match rollback_once(conn) {
            Ok(()) => return Ok(()),
            Err(err) if is_busy(&err) => match delays.next() {
                Some(delay) => {
                    tracing::debug!(delay = ?delay, "rollback busy, retrying");
                    thread::sleep(*delay);
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

/// Marks a transaction abandoned when the caller's future is dropped before
/// the blocking work finishes; the work then rolls back instead of committing.
struct AbandonOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
            tracing::debug!("caller stopped waiting for transaction");
        }
    }
}

/// Run `op` between `BEGIN` and `COMMIT`, rolling back if it fails.
///
/// The error returned for a failed operation is the operation's own error;
/// only when the rollback fails too is it wrapped in `RollbackFailed`.
pub(crate) fn run_scoped<F, T>(conn: &mut rusqlite::Connection, op: F) -> Result<T, EngineError>
where
    F: FnOnce(&mut TxContext<'_>) -> Result<T, EngineError>,
{
    conn.execute_batch("BEGIN")
        .map_err(EngineError::BeginFailed)?;
    tracing::debug!("transaction started");

    let outcome = op(&mut TxContext::new(conn));

    match outcome {
        Ok(value) => match conn.execute_batch("COMMIT") {
            Ok(()) => {
                tracing::debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                if !conn.is_autocommit()
                    && let Err(rollback_err) = rollback_with_busy_retries(conn)
                {
                    tracing::warn!(error = %rollback_err, "rollback after failed commit also failed");
                }
                Err(EngineError::CommitFailed(err))
            }
        },
        Err(cause) => {
            if conn.is_autocommit() {
                // SQLite already ended the transaction for this error.
                tracing::debug!(error = %cause, "transaction ended by sqlite, skipping rollback");
                return Err(cause);
            }
            match rollback_with_busy_retries(conn) {
                Ok(()) => {
                    tracing::debug!(error = %cause, "transaction rolled back");
                    Err(cause)
                }
                Err(source) => {
                    tracing::warn!(error = %source, "rollback failed");
                    Err(EngineError::RollbackFailed {
                        cause: Box::new(cause),
                        source,
                    })
                }
            }
        }
    }
}

/// Commit-or-rollback wrapper around units of work on the pooled connection.
#[derive(Debug, Clone, Copy)]
pub struct TransactionExecutor<'p> {
    pool: &'p ConnectionPool,
}

impl<'p> TransactionExecutor<'p> {
    #[must_use]
    pub fn new(pool: &'p ConnectionPool) -> Self {
        Self { pool }
    }

    /// Acquire the connection, run `op` in a transaction, and release the
    /// connection on every exit path.
    ///
    /// # Errors
    /// Returns the pool's error if no connection could be acquired (no
    /// transaction is started), `BeginFailed`/`CommitFailed` for boundary
    /// failures, or the operation's own error after a rollback.
    pub async fn run_in_transaction<F, T>(&self, op: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut TxContext<'_>) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.acquire().await?;
        let abandoned = Arc::new(AtomicBool::new(false));
        let mut watch = AbandonOnDrop {
            flag: Arc::clone(&abandoned),
            armed: true,
        };

        // The pooled slot travels with the blocking work, so it is only
        // returned once COMMIT or ROLLBACK has finished.
        let work = tokio::task::spawn_blocking(move || {
            let handle = conn.handle();
            let outcome = {
                let mut guard = handle.blocking_lock();
                run_scoped(&mut guard, |tx| {
                    let value = op(tx)?;
                    if abandoned.load(Ordering::Acquire) {
                        return Err(EngineError::ExecutionError(
                            "caller stopped waiting before commit".into(),
                        ));
                    }
                    Ok(value)
                })
            };
            conn.release();
            outcome
        });

        let joined = work.await;
        watch.armed = false;
        joined.map_err(|e| {
            EngineError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
        })?
    }
}
