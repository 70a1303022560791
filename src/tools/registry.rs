//! Tool registry
//!
//! Built once at startup, then shared read-only behind an `Arc`.

use std::collections::HashMap;

use crate::error::{AgentError, Result};

use super::definition::{InputContract, ToolDescriptor, ToolKind};

pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
pub const SCHEMA_TOOL: &str = "sql_db_schema";
pub const QUERY_CHECKER_TOOL: &str = "sql_db_query_checker";
pub const QUERY_TOOL: &str = "sql_db_query";

/// Registry of tool descriptors, kept in registration order
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the SQL toolkit
    pub fn standard() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(ToolDescriptor::new(
            QUERY_TOOL,
            "Execute a read-only SQL query against the database and get back the rows. \
             If the query is not correct, an error message is returned; rewrite the query and try again. \
             If you get an error about an unknown column, use sql_db_schema to check the table fields.",
            InputContract::Sql,
            ToolKind::Query,
        ))?;
        registry.register(ToolDescriptor::new(
            SCHEMA_TOOL,
            "Get the schema of the given tables. Be sure the tables exist by calling sql_db_list_tables first!",
            InputContract::TableList,
            ToolKind::Schema,
        ))?;
        registry.register(ToolDescriptor::new(
            LIST_TABLES_TOOL,
            "List the tables in the database.",
            InputContract::None,
            ToolKind::ListTables,
        ))?;
        registry.register(ToolDescriptor::new(
            QUERY_CHECKER_TOOL,
            "Check whether a query is valid and allowed before running it with sql_db_query.",
            InputContract::Sql,
            ToolKind::QueryChecker,
        ))?;
        Ok(registry)
    }

    /// Register a tool; names must be unique
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(AgentError::DuplicateTool(descriptor.name));
        }
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    /// Look up a tool by name
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All descriptors in registration order
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// "name: description" block for the prompt
    pub fn render_catalog(&self) -> String {
        self.tools
            .iter()
            .map(|t| t.catalog_line())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
