use std::future::Future;
use std::sync::Arc;

use bb8::ManageConnection;
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::sqlite::EngineOptions;

/// Connection handle shared between the pool and the blocking worker that drives it.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// bb8 manager that opens file-backed `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    db_path: String,
    pragmas: ConnectionPragmas,
}

/// Per-connection settings applied right after the store is opened.
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    wal: bool,
    foreign_keys: bool,
}

impl ConnectionPragmas {
    fn apply(self, conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
        if self.wal {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        if self.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        }
        Ok(())
    }
}

impl SqliteManager {
    #[must_use]
    pub fn new(opts: &EngineOptions) -> Self {
        Self {
            db_path: opts.db_path.clone(),
            pragmas: ConnectionPragmas {
                wal: opts.wal,
                foreign_keys: opts.foreign_keys,
            },
        }
    }

    #[must_use]
    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

fn open_connection(
    path: &str,
    pragmas: ConnectionPragmas,
) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    pragmas.apply(&conn)?;
    // Opening is lazy in SQLite; touch the schema so bad files fail here.
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(conn)
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = EngineError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = self.db_path.clone();
        let pragmas = self.pragmas;
        async move {
            tracing::debug!(path = %path, "opening sqlite connection");
            let opened = tokio::task::spawn_blocking({
                let path = path.clone();
                move || open_connection(&path, pragmas)
            })
            .await
            .map_err(|e| {
                EngineError::ExecutionError(format!("sqlite open join error: {e}"))
            })?;
            match opened {
                Ok(conn) => Ok(Arc::new(Mutex::new(conn))),
                Err(source) => {
                    tracing::warn!(path = %path, error = %source, "failed to open sqlite store");
                    Err(EngineError::ConnectFailed { path, source })
                }
            }
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let handle = Arc::clone(conn);
        async move {
            run_blocking(handle, |guard| {
                guard
                    .execute_batch("SELECT 1")
                    .map_err(EngineError::SqliteError)
            })
            .await
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        // A connection still inside a transaction must never be handed out again.
        match conn.try_lock() {
            Ok(guard) => {
                let broken = !guard.is_autocommit();
                if broken {
                    tracing::warn!("evicting sqlite connection left inside a transaction");
                }
                broken
            }
            Err(_) => true,
        }
    }
}

/// Run synchronous `SQLite` work on a blocking thread with exclusive access to the connection.
async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, EngineError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, EngineError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| EngineError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}
