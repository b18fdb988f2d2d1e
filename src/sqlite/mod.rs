// SQLite backing store.
//
// - config: engine options and the fluent builder
// - manager: bb8 connection manager and the blocking-work bridge

pub mod config;
pub mod manager;

pub use config::{EngineOptions, EngineOptionsBuilder, POOL_CAPACITY};
pub use manager::{SharedSqliteConnection, SqliteManager};
