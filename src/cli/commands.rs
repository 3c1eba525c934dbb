//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: drive one or more symposiums until Ctrl-C
//! - echo: splice a narrator line into a conversation
//! - export / import / validate: portable symposium configs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Symposium - turn-taking scheduler for multi-model conversations
#[derive(Parser, Debug)]
#[command(name = "symposium")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the configured database path
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

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
    /// Run symposium loops until interrupted
    Run {
        /// Conversation ids to run
        ids: Vec<String>,

        /// Run every unarchived conversation in symposium mode
        #[arg(short, long)]
        all: bool,
    },

    /// Append an echo line to a conversation
    Echo {
        /// Conversation id
        id: String,

        /// Text of the line
        content: String,
    },

    /// Export a conversation's symposium config as JSON
    Export {
        /// Conversation id
        id: String,

        /// Name stored in the export (defaults to the conversation title)
        #[arg(short, long)]
        name: Option<String>,

        /// Directory to write `<name>_config.json` into; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply an exported config to a conversation
    Import {
        /// Export file
        file: PathBuf,

        /// Conversation id to apply it to
        id: String,
    },

    /// Check an export file without applying it
    Validate {
        /// Export file
        file: PathBuf,
    },
}
