//! Bounded pool of read-only SQLite connections

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{ErrorCode, OpenFlags};

use crate::config::DatabaseConfig;
use crate::error::{AgentError, Result};

pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Connection pool; cheap to clone, clones share the same connections
#[derive(Clone)]
pub struct DbPool {
    pool: Pool<SqliteConnectionManager>,
    acquire_timeout: Duration,
    path: PathBuf,
}

impl DbPool {
    /// Open a pool for the configured database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = config.database_path()?;
        Self::open_path(&path, config.pool_size, config.acquire_timeout())
    }

    /// Open a pool of `size` read-only connections to the database at `path`
    pub fn open_path(path: &Path, size: u32, acquire_timeout: Duration) -> Result<Self> {
        if size == 0 {
            return Err(AgentError::Config("database.pool_size must be at least 1".to_string()));
        }

        let manager = SqliteConnectionManager::file(path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .with_init(|conn| conn.execute_batch("PRAGMA query_only = ON;"));

        let pool = Pool::builder()
            .max_size(size)
            .connection_timeout(acquire_timeout)
            .build(manager)
            .map_err(|e| AgentError::DatabaseUnavailable(format!("{}: {}", path.display(), e)))?;

        info!("Opened database pool: path={}, size={}", path.display(), size);

        Ok(Self {
            pool,
            acquire_timeout,
            path: path.to_path_buf(),
        })
    }

    /// Check out a connection, waiting at most the acquire timeout.
    ///
    /// Blocks the calling thread.
    pub fn acquire(&self) -> Result<PooledConn> {
        match self.pool.get_timeout(self.acquire_timeout) {
            Ok(conn) => Ok(conn),
            Err(e) => {
                let in_use = self.in_use();
                debug!(
                    "Pool checkout failed: path={}, in_use={}, max={}",
                    self.path.display(),
                    in_use,
                    self.pool.max_size()
                );
                if in_use >= self.pool.max_size() {
                    Err(AgentError::ResourceExhausted(format!(
                        "all {} database connections are busy",
                        self.pool.max_size()
                    )))
                } else {
                    Err(AgentError::DatabaseUnavailable(format!("{}: {}", self.path.display(), e)))
                }
            }
        }
    }

    /// Connections currently checked out
    pub fn in_use(&self) -> u32 {
        let state = self.pool.state();
        state.connections.saturating_sub(state.idle_connections)
    }
}

/// How a rusqlite error should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The database itself cannot be reached; retry with a fresh connection
    Connectivity,
    /// The statement was interrupted
    Interrupted,
    /// Anything the oracle can fix by rewriting its query
    Query,
}

pub fn classify(err: &rusqlite::Error) -> FailureClass {
    match err.sqlite_error_code() {
        Some(ErrorCode::CannotOpen | ErrorCode::SystemIoFailure | ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => {
            FailureClass::Connectivity
        }
        Some(ErrorCode::OperationInterrupted) => FailureClass::Interrupted,
        _ => FailureClass::Query,
    }
}
