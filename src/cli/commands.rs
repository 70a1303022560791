//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: run the HTTP server
//! - ask: answer one question from the terminal
//! - tools: print the tool catalog

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sqlagent - ask questions of a SQLite database in plain language
#[derive(Parser, Debug)]
#[command(name = "sqlagent")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind, overriding server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Answer a single question and exit
    Ask {
        /// The question to answer
        prompt: String,

        /// Print the full reasoning transcript
        #[arg(short, long)]
        transcript: bool,
    },

    /// Print the tool catalog
    Tools,
}
