use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bb8::{ErrorSink, Pool, PooledConnection, RunError};
use tokio::sync::Notify;

use crate::error::EngineError;
use crate::sqlite::{EngineOptions, POOL_CAPACITY, SharedSqliteConnection, SqliteManager};

/// Snapshot of the pool's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Live connections, idle or checked out.
    pub connections: u32,
    pub idle: u32,
    pub closed: bool,
}

/// Collects connection-open failures reported by bb8 and wakes callers
/// waiting on a checkout, so they fail at once instead of running out the
/// connection timeout.
#[derive(Debug, Clone, Default)]
struct ConnectFailures {
    last: Arc<Mutex<Option<EngineError>>>,
    signal: Arc<Notify>,
}

impl ConnectFailures {
    fn take(&self) -> Option<EngineError> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Take the recorded failure if it means the store cannot be opened.
    /// Other failures (a connection failing its validity check) leave bb8 to
    /// retry and are not reported to the waiter.
    fn take_open_failure(&self) -> Option<EngineError> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*last, Some(EngineError::ConnectFailed { .. })) {
            last.take()
        } else {
            None
        }
    }
}

impl ErrorSink<EngineError> for ConnectFailures {
    fn sink(&self, error: EngineError) {
        tracing::warn!(error = %error, "sqlite connection attempt failed");
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self.signal.notify_waiters();
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<EngineError>> {
        Box::new(self.clone())
    }
}

/// A checked-out connection. Dropping it returns the slot to the pool.
pub struct PooledSqlite {
    conn: PooledConnection<'static, SqliteManager>,
}

impl PooledSqlite {
    /// Handle for running blocking work against the connection.
    #[must_use]
    pub fn handle(&self) -> SharedSqliteConnection {
        Arc::clone(&*self.conn)
    }

    /// Return the slot to the pool.
    pub fn release(self) {
        tracing::debug!("released sqlite connection");
        drop(self);
    }
}

impl std::fmt::Debug for PooledSqlite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSqlite").finish_non_exhaustive()
    }
}

/// Bounded broker for the single live connection to the backing store.
pub struct ConnectionPool {
    inner: RwLock<Option<Pool<SqliteManager>>>,
    connection_timeout: Duration,
    connect_failures: ConnectFailures,
}

impl ConnectionPool {
    /// Create the pool without opening the store; the first `acquire` connects.
    ///
    /// Must be called from within a tokio runtime, which drives the idle reaper.
    ///
    /// # Errors
    /// Returns `EngineError::ConfigError` if the options are invalid.
    pub fn new(opts: &EngineOptions) -> Result<Self, EngineError> {
        opts.validate()?;
        let connect_failures = ConnectFailures::default();
        let pool = Pool::builder()
            .max_size(POOL_CAPACITY)
            .connection_timeout(opts.connection_timeout)
            .idle_timeout(Some(opts.idle_timeout))
            .max_lifetime(Some(opts.max_lifetime))
            .retry_connection(false)
            .error_sink(Box::new(connect_failures.clone()))
            .build_unchecked(SqliteManager::new(opts));
        tracing::debug!(path = %opts.db_path, capacity = POOL_CAPACITY, "created sqlite pool");
        Ok(Self {
            inner: RwLock::new(Some(pool)),
            connection_timeout: opts.connection_timeout,
            connect_failures,
        })
    }

    fn pool(&self) -> Option<Pool<SqliteManager>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the connection, up to the configured timeout.
    ///
    /// A failure to open the store ends the wait as soon as bb8 reports it.
    ///
    /// # Errors
    /// Returns `PoolClosed` after [`close`](Self::close), `ConnectFailed` if the store
    /// cannot be opened, and `PoolExhausted` or `PoolTimeout` when the wait runs out.
    pub async fn acquire(&self) -> Result<PooledSqlite, EngineError> {
        let pool = self.pool().ok_or(EngineError::PoolClosed)?;
        // Failures recorded before this wait belong to someone else.
        self.connect_failures.take();

        let checkout = pool.get_owned();
        tokio::pin!(checkout);
        loop {
            let failed = self.connect_failures.signal.notified();
            tokio::pin!(failed);
            failed.as_mut().enable();
            if let Some(err) = self.connect_failures.take_open_failure() {
                return Err(err);
            }

            tokio::select! {
                res = &mut checkout => return self.finish_checkout(&pool, res),
                () = &mut failed => {
                    if let Some(err) = self.connect_failures.take_open_failure() {
                        return Err(err);
                    }
                }
            }
        }
    }

    fn finish_checkout(
        &self,
        pool: &Pool<SqliteManager>,
        res: Result<PooledConnection<'static, SqliteManager>, RunError<EngineError>>,
    ) -> Result<PooledSqlite, EngineError> {
        match res {
            Ok(conn) => {
                tracing::debug!("acquired sqlite connection");
                Ok(PooledSqlite { conn })
            }
            Err(RunError::User(err)) => Err(err),
            Err(RunError::TimedOut) => {
                if let Some(err) = self.connect_failures.take_open_failure() {
                    return Err(err);
                }
                let state = pool.state();
                if state.connections >= POOL_CAPACITY && state.idle_connections == 0 {
                    Err(EngineError::PoolExhausted {
                        capacity: POOL_CAPACITY,
                        waited: self.connection_timeout,
                    })
                } else {
                    Err(EngineError::PoolTimeout(self.connection_timeout))
                }
            }
        }
    }

    /// Hand the connection back for reuse.
    pub fn release(&self, conn: PooledSqlite) {
        conn.release();
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        match self.pool() {
            Some(pool) => {
                let state = pool.state();
                PoolStatus {
                    connections: state.connections,
                    idle: state.idle_connections,
                    closed: false,
                }
            }
            None => PoolStatus {
                connections: 0,
                idle: 0,
                closed: true,
            },
        }
    }

    /// Tear the pool down. Idle connections close now; a checked-out
    /// connection closes when its holder releases it.
    pub fn close(&self) {
        let pool = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pool.is_some() {
            tracing::debug!("closed sqlite pool");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status().closed
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("status", &self.status())
            .field("connection_timeout", &self.connection_timeout)
            .finish_non_exhaustive()
    }
}
