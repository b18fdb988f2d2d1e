pub mod materialize;
pub mod result_set;

pub use materialize::{materialize, read_metadata, read_value};
pub use result_set::QueryResult;
