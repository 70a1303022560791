//! Tool routing
//!
//! The reasoning loop only sees this trait; `SqlExecutor` is the production
//! implementation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::sql::{QueryResult, SqlExecutor};

use super::definition::ToolDescriptor;

/// Trait for executing a resolved tool call
#[async_trait]
pub trait ToolRouter: Send + Sync {
    /// Execute `tool` with the raw argument string from the oracle
    async fn execute(&self, tool: &ToolDescriptor, argument: &str, cancel: &CancellationToken) -> Result<QueryResult>;
}

#[async_trait]
impl ToolRouter for SqlExecutor {
    async fn execute(&self, tool: &ToolDescriptor, argument: &str, cancel: &CancellationToken) -> Result<QueryResult> {
        SqlExecutor::execute(self, tool, argument, cancel).await
    }
}
