//! Transactional execution over a file-backed `SQLite` store.
//!
//! All access goes through a single pooled connection. Each call runs inside
//! an explicit transaction that commits on success and rolls back on failure,
//! and query results are copied into a typed [`QueryResult`] before the
//! connection is released.

pub mod engine;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod sqlite;
pub mod transaction;
pub mod types;

pub use engine::Engine;
pub use error::EngineError;
pub use results::QueryResult;
pub use types::{ColumnMetadata, ColumnValue, DeclaredType, ValueKind};
