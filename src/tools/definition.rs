//! Tool descriptors and input contracts
//!
//! A descriptor says what a tool is called, how the oracle should call it, and
//! which guard operation serves it.

use serde::{Deserialize, Serialize};

/// Shape of the argument string a tool expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputContract {
    /// Argument is ignored
    None,
    /// Free text
    Text,
    /// Comma-separated table names
    TableList,
    /// A single SQL statement
    Sql,
}

impl InputContract {
    /// Short hint appended to the tool description in the prompt
    pub fn hint(&self) -> &'static str {
        match self {
            Self::None => "Input is an empty string.",
            Self::Text => "Input is free text.",
            Self::TableList => "Input is a comma-separated list of tables.",
            Self::Sql => "Input is a single SQL query.",
        }
    }
}

/// Which guard operation serves a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    ListTables,
    Schema,
    QueryChecker,
    Query,
}

/// An immutable tool descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (e.g., "sql_db_query")
    pub name: String,
    /// One-line description for the oracle
    pub description: String,
    pub input: InputContract,
    pub kind: ToolKind,
}

impl ToolDescriptor {
    /// Create a new tool descriptor
    pub fn new(name: impl Into<String>, description: impl Into<String>, input: InputContract, kind: ToolKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input,
            kind,
        }
    }

    /// "name: description hint" line for the tool catalog
    pub fn catalog_line(&self) -> String {
        format!("{}: {} {}", self.name, self.description, self.input.hint())
    }
}
