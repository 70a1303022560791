//! Error types for sqlagent
//!
//! Centralized error handling using thiserror. Every variant carries a stable
//! `kind()` for the wire and a `safe_message()` that never leaks raw database text.

use thiserror::Error;

/// All error types that can occur in sqlagent
#[derive(Debug, Error)]
pub enum AgentError {
    /// Oracle output could not be decoded into an action
    #[error("Parse error: {0}")]
    Parse(String),

    /// Tool name is not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool name registered twice
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// Statement rejected by the read-only guard
    #[error("Forbidden operation: {0}")]
    ForbiddenOperation(String),

    /// Query exceeded the configured timeout and was interrupted
    #[error("Query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Reasoning loop used every step without a final answer
    #[error("Step limit exceeded: no final answer after {max_steps} steps")]
    StepLimitExceeded { max_steps: u32 },

    /// Oracle kept producing unusable output
    #[error("Malformed step budget exceeded: {malformed} malformed steps (budget {budget})")]
    MalformedStepBudgetExceeded { malformed: u32, budget: u32 },

    /// No pooled connection became available in time
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Connectivity loss that persisted across retries
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    /// Recoverable database error (bad SQL, missing table, ...)
    #[error("Database error: {0}")]
    Database(String),

    /// Oracle is misconfigured or refuses requests
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Request was cancelled before the loop finished
    #[error("Request cancelled")]
    Cancelled,

    /// Malformed inbound request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Stable, machine-readable category
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Parse(_) => "parse_error",
            AgentError::UnknownTool(_) => "unknown_tool",
            AgentError::DuplicateTool(_) => "duplicate_tool",
            AgentError::ForbiddenOperation(_) => "forbidden_operation",
            AgentError::QueryTimeout { .. } => "query_timeout",
            AgentError::StepLimitExceeded { .. } => "step_limit_exceeded",
            AgentError::MalformedStepBudgetExceeded { .. } => "malformed_output",
            AgentError::ResourceExhausted(_) => "resource_exhausted",
            AgentError::DatabaseUnavailable(_) => "database_unavailable",
            AgentError::Database(_) => "database_error",
            AgentError::OracleUnavailable(_) => "oracle_unavailable",
            AgentError::Cancelled => "cancelled",
            AgentError::InvalidRequest(_) => "invalid_request",
            AgentError::Config(_) => "configuration_error",
            AgentError::Io(_) => "io_error",
            AgentError::Json(_) => "json_error",
        }
    }

    /// Summary that is safe to show a caller
    pub fn safe_message(&self) -> String {
        match self {
            AgentError::StepLimitExceeded { max_steps } => {
                format!("The agent did not reach an answer within {} steps", max_steps)
            }
            AgentError::MalformedStepBudgetExceeded { .. } => {
                "The language model repeatedly produced output in an unexpected format".to_string()
            }
            AgentError::ResourceExhausted(_) => "The database is busy, try again later".to_string(),
            AgentError::DatabaseUnavailable(_) | AgentError::Database(_) => {
                "The database is currently unavailable".to_string()
            }
            AgentError::OracleUnavailable(_) => "The language model is currently unavailable".to_string(),
            AgentError::Cancelled => "The request was cancelled".to_string(),
            AgentError::InvalidRequest(msg) => msg.clone(),
            AgentError::QueryTimeout { .. } => "A database query took too long".to_string(),
            _ => "Internal error".to_string(),
        }
    }

    /// Client errors are the caller's fault; everything else is on the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, AgentError::InvalidRequest(_))
    }

    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ResourceExhausted(_) | AgentError::DatabaseUnavailable(_) | AgentError::OracleUnavailable(_)
        )
    }
}

/// Result type alias for sqlagent operations
pub type Result<T> = std::result::Result<T, AgentError>;
