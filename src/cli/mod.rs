//! CLI module for symposium - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running symposiums and
//! moving their configs between conversations.

pub mod commands;

pub use commands::Cli;
