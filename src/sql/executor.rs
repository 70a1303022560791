//! Guarded execution of SQL tools
//!
//! Every database call runs on the blocking pool with a checked-out connection.
//! The async side waits under the query timeout and the request's cancellation
//! token; when either fires (or the waiting future is dropped) the statement is
//! interrupted through the connection's interrupt handle, so abandoned queries
//! never keep running.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, ffi};
use serde_json::{Number, Value};
use tokio_util::sync::CancellationToken;

use crate::config::DatabaseConfig;
use crate::error::{AgentError, Result};
use crate::tools::{ToolDescriptor, ToolKind};

use super::guard::validate_read_only;
use super::pool::{DbPool, FailureClass, PooledConn, classify};
use super::result::{QueryResult, Row};

const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name";
const TABLE_DDL_SQL: &str = "SELECT sql FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1";
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Limits applied to every execution
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub query_timeout: Duration,
    pub max_rows: usize,
    pub connect_retries: u32,
}

impl From<&DatabaseConfig> for ExecutionLimits {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            query_timeout: config.query_timeout(),
            max_rows: config.max_rows,
            connect_retries: config.connect_retries,
        }
    }
}

/// Why a blocking database operation did not produce a value
#[derive(Debug)]
enum ExecFailure {
    Forbidden(String),
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for ExecFailure {
    fn from(err: rusqlite::Error) -> Self {
        ExecFailure::Sqlite(err)
    }
}

/// Interrupts the running statement unless disarmed.
///
/// `sqlite3_interrupt` is a no-op while no statement runs, so dropping the guard
/// also raises `abandoned`; the blocking side checks it before starting work.
struct InterruptOnDrop {
    handle: Option<InterruptHandle>,
    abandoned: Arc<AtomicBool>,
}

impl InterruptOnDrop {
    fn new(handle: InterruptHandle) -> Self {
        Self {
            handle: Some(handle),
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    fn abandoned(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abandoned)
    }

    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Interrupting abandoned statement");
            self.abandoned.store(true, Ordering::SeqCst);
            handle.interrupt();
        }
    }
}

/// Run `op` unless the waiting side already gave up on it
fn run_unless_abandoned<T, F>(conn: &Connection, abandoned: &AtomicBool, op: &F) -> std::result::Result<T, ExecFailure>
where
    F: Fn(&Connection) -> std::result::Result<T, ExecFailure>,
{
    if abandoned.load(Ordering::SeqCst) {
        debug!("Skipping statement abandoned before it started");
        return Err(ExecFailure::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_INTERRUPT),
            Some("statement abandoned before it started".to_string()),
        )));
    }
    op(conn)
}

/// Runs SQL tools against the pool under the guard's rules
#[derive(Clone)]
pub struct SqlExecutor {
    pool: DbPool,
    limits: ExecutionLimits,
}

impl SqlExecutor {
    pub fn new(pool: DbPool, limits: ExecutionLimits) -> Self {
        Self { pool, limits }
    }

    /// Open the configured database and wrap it in an executor
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(DbPool::open(config)?, ExecutionLimits::from(config)))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Execute a tool with its raw argument.
    ///
    /// Recoverable database errors come back as `QueryResult::Error` so the
    /// oracle can correct itself. Guard rejections, timeouts, pool exhaustion,
    /// persistent connectivity loss and cancellation are returned as errors.
    pub async fn execute(&self, tool: &ToolDescriptor, argument: &str, cancel: &CancellationToken) -> Result<QueryResult> {
        debug!("Executing tool: name={}, argument={:?}", tool.name, argument);

        let outcome = match tool.kind {
            ToolKind::ListTables => self.list_tables(cancel).await,
            ToolKind::Schema => self.schema(argument, cancel).await,
            ToolKind::QueryChecker => self.check_query(argument, cancel).await,
            ToolKind::Query => self.query(argument, cancel).await,
        };

        match outcome {
            Err(AgentError::Database(message)) => {
                debug!("Tool {} returned database error: {}", tool.name, message);
                Ok(QueryResult::error(message))
            }
            other => other,
        }
    }

    async fn list_tables(&self, cancel: &CancellationToken) -> Result<QueryResult> {
        let names = self
            .run_blocking(cancel, |conn| {
                let mut stmt = conn.prepare(LIST_TABLES_SQL)?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(names)
            })
            .await?;

        if names.is_empty() {
            return Ok(QueryResult::text("The database has no tables."));
        }
        Ok(QueryResult::text(names.join(", ")))
    }

    async fn schema(&self, argument: &str, cancel: &CancellationToken) -> Result<QueryResult> {
        let mut tables: Vec<String> = Vec::new();
        for name in argument.split(',').map(|t| t.trim().trim_matches(|c| c == '"' || c == '`')) {
            if !name.is_empty() && !tables.iter().any(|t| t == name) {
                tables.push(name.to_string());
            }
        }
        if tables.is_empty() {
            return Ok(QueryResult::error(
                "no table names given; pass a comma-separated list such as: users, orders",
            ));
        }

        let lookups = tables.clone();
        let found = self
            .run_blocking(cancel, move |conn| {
                let mut stmt = conn.prepare(TABLE_DDL_SQL)?;
                let mut found = Vec::with_capacity(lookups.len());
                for table in &lookups {
                    let ddl: Option<String> = stmt
                        .query_map([table], |row| row.get::<_, Option<String>>(0))?
                        .next()
                        .transpose()?
                        .flatten();
                    found.push(ddl);
                }
                Ok(found)
            })
            .await?;

        let missing: Vec<&str> = tables
            .iter()
            .zip(&found)
            .filter(|(_, ddl)| ddl.is_none())
            .map(|(t, _)| t.as_str())
            .collect();
        if !missing.is_empty() {
            return Ok(QueryResult::error(format!(
                "table_names {{{}}} not found in database",
                missing.join(", ")
            )));
        }

        let schema = found.into_iter().flatten().collect::<Vec<_>>().join("\n\n");
        Ok(QueryResult::text(schema))
    }

    async fn check_query(&self, argument: &str, cancel: &CancellationToken) -> Result<QueryResult> {
        let statement = validate_read_only(argument)?;
        let checked = statement.clone();

        self.run_blocking(cancel, move |conn| {
            let stmt = conn.prepare(&checked)?;
            ensure_readonly(&stmt)?;
            Ok(())
        })
        .await?;

        Ok(QueryResult::text(format!("The query is valid and read-only: {}", statement)))
    }

    async fn query(&self, argument: &str, cancel: &CancellationToken) -> Result<QueryResult> {
        let statement = validate_read_only(argument)?;
        let max_rows = self.limits.max_rows;

        let result = self
            .run_blocking(cancel, move |conn| run_query(conn, &statement, max_rows))
            .await?;

        if result.is_truncated() {
            info!("Query result truncated to {} rows", max_rows);
        }
        Ok(result)
    }

    /// Run `op` on a pooled connection under the timeout and the cancellation token
    async fn run_blocking<T, F>(&self, cancel: &CancellationToken, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> std::result::Result<T, ExecFailure> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let mut attempt = 0;

        loop {
            let conn = self.acquire(cancel).await?;
            let interrupt = InterruptOnDrop::new(conn.get_interrupt_handle());
            let abandoned = interrupt.abandoned();
            let task_op = Arc::clone(&op);
            let task = tokio::task::spawn_blocking(move || run_unless_abandoned(&conn, &abandoned, &*task_op));

            let joined = tokio::select! {
                joined = tokio::time::timeout(self.limits.query_timeout, task) => joined,
                _ = cancel.cancelled() => {
                    info!("Query cancelled");
                    return Err(AgentError::Cancelled);
                }
            };

            let Ok(joined) = joined else {
                warn!("Query exceeded {:?}, interrupting", self.limits.query_timeout);
                return Err(AgentError::QueryTimeout {
                    timeout_ms: self.limits.query_timeout.as_millis() as u64,
                });
            };
            interrupt.disarm();

            let failure = match joined {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(failure)) => failure,
                Err(e) => return Err(AgentError::Database(format!("query task failed: {}", e))),
            };

            match failure {
                ExecFailure::Forbidden(msg) => return Err(AgentError::ForbiddenOperation(msg)),
                ExecFailure::Sqlite(err) => match classify(&err) {
                    FailureClass::Connectivity if attempt < self.limits.connect_retries => {
                        attempt += 1;
                        warn!(
                            "Database connectivity error, retrying ({}/{}): {}",
                            attempt, self.limits.connect_retries, err
                        );
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    }
                    FailureClass::Connectivity => return Err(AgentError::DatabaseUnavailable(err.to_string())),
                    FailureClass::Interrupted => {
                        return Err(AgentError::QueryTimeout {
                            timeout_ms: self.limits.query_timeout.as_millis() as u64,
                        });
                    }
                    FailureClass::Query => return Err(AgentError::Database(err.to_string())),
                },
            }
        }
    }

    /// Check out a connection, retrying connectivity failures
    async fn acquire(&self, cancel: &CancellationToken) -> Result<PooledConn> {
        let mut attempt = 0;

        loop {
            let pool = self.pool.clone();
            let task = tokio::task::spawn_blocking(move || pool.acquire());

            let result = tokio::select! {
                joined = task => joined.map_err(|e| AgentError::Database(format!("pool task failed: {}", e)))?,
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            };

            match result {
                Err(AgentError::DatabaseUnavailable(msg)) if attempt < self.limits.connect_retries => {
                    attempt += 1;
                    warn!(
                        "Database unavailable, retrying ({}/{}): {}",
                        attempt, self.limits.connect_retries, msg
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }
}

fn ensure_readonly(stmt: &rusqlite::Statement<'_>) -> std::result::Result<(), ExecFailure> {
    if stmt.readonly() {
        Ok(())
    } else {
        Err(ExecFailure::Forbidden(
            "statement would modify the database; only read-only queries may be run".to_string(),
        ))
    }
}

fn run_query(conn: &Connection, sql: &str, max_rows: usize) -> std::result::Result<QueryResult, ExecFailure> {
    let mut stmt = conn.prepare(sql)?;
    ensure_readonly(&stmt)?;

    let columns = unique_column_names(stmt.column_names());
    let mut rows = stmt.query([])?;
    let mut out: Vec<Row> = Vec::new();
    let mut truncated = false;

    while let Some(row) = rows.next()? {
        if out.len() == max_rows {
            truncated = true;
            break;
        }
        let mut record = Row::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), json_value(row.get_ref(i)?));
        }
        out.push(record);
    }

    Ok(QueryResult::Rows {
        columns,
        rows: out,
        truncated,
    })
}

/// Column keys for row maps; a repeated name gets the first free `_N` suffix
fn unique_column_names(names: Vec<&str>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(names.len());

    for (i, name) in names.iter().enumerate() {
        let mut key = name.to_string();
        let mut suffix = i;
        while taken.contains(&key) {
            key = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        taken.insert(key.clone());
        unique.push(key);
    }

    unique
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("x'{}'", hex::encode(bytes))),
    }
}
