//! Convenient imports for common functionality.

pub use crate::engine::Engine;
pub use crate::error::EngineError;
pub use crate::pool::{ConnectionPool, PoolStatus};
pub use crate::results::QueryResult;
pub use crate::sqlite::{EngineOptions, EngineOptionsBuilder};
pub use crate::transaction::{TransactionExecutor, TxContext};
pub use crate::types::{ColumnMetadata, ColumnValue, ValueKind};
