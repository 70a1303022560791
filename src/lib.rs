//! sqlagent - a natural-language-to-SQL agent
//!
//! sqlagent answers plain-language questions about a SQLite database by running
//! a ReAct loop: an oracle (LLM) thinks, asks for a tool, sees the observation,
//! and repeats until it can give a final answer. Every query the oracle writes
//! passes a read-only guard and runs under time, row and connection bounds.

pub mod agent;
pub mod config;
pub mod error;
pub mod id;
pub mod llm;
pub mod prompt;
pub mod runner;
pub mod server;
pub mod sql;
pub mod storage;
pub mod tools;

pub use agent::Agent;
pub use error::{AgentError, Result};
