//! SQL Execution Guard - read-only validation, pooled connections, bounded execution

mod executor;
mod guard;
mod pool;
mod result;

pub use executor::{ExecutionLimits, SqlExecutor};
pub use guard::validate_read_only;
pub use pool::{DbPool, FailureClass, PooledConn, classify};
pub use result::{QueryResult, Row};
