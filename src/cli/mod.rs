//! CLI module for sqlagent - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
