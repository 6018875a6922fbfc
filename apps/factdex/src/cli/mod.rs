//! # factdex CLI Module
//!
//! This module implements the CLI interface for factdex.
//!
//! ## Available Commands
//!
//! - `index` - Build fixtures for a set of hosts and rewrite the index
//! - `facts` - Print the sanitized fixture of one host
//! - `select` - Run a selection against the index
//! - `nodes` - List indexed nodes
//! - `hash` - Checksums of the canonical index

mod commands;

use crate::config::{Overrides, Settings};
use clap::{Parser, Subcommand};
use factdex_core::FactdexError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// factdex - fact fixtures and the index that selects them
#[derive(Parser, Debug)]
#[command(name = "factdex")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Index file (overrides the configuration file)
    #[arg(short = 'i', long, global = true)]
    pub index_file: Option<PathBuf>,

    /// redb record cache (overrides the configuration file)
    #[arg(long, global = true)]
    pub record_cache: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build fixtures for hosts and reindex the configured facts
    Index {
        /// Hosts to process (default: nodes of the current index)
        #[arg(short = 'l', long, value_delimiter = ',')]
        hosts: Vec<String>,

        /// Reuse existing fixtures instead of rebuilding them
        #[arg(short, long)]
        quick: bool,

        /// Fixture directory
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Print the sanitized facts of one host
    Facts {
        /// Host name
        #[arg(short = 'H', long)]
        hostname: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Select a node by its facts
    Select {
        /// Keep nodes with attribute=value (repeatable)
        #[arg(short, long)]
        select: Vec<String>,

        /// Drop nodes with attribute=value (repeatable)
        #[arg(short, long)]
        reject: Vec<String>,

        /// Prefer nodes with attribute=value (repeatable)
        #[arg(short, long)]
        prefer: Vec<String>,

        /// Refuse to index attributes on demand
        #[arg(long)]
        strict: bool,

        /// Print the chosen node's facts
        #[arg(long)]
        show_facts: bool,
    },

    /// List indexed nodes
    Nodes {
        /// Recompute the list from the buckets instead of the stored list
        #[arg(short, long)]
        full: bool,
    },

    /// Compute checksums of the canonical index
    Hash,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), FactdexError> {
    let json_mode = cli.json_mode;
    let mut overrides = Overrides {
        index_file: cli.index_file,
        record_cache: cli.record_cache,
        ..Overrides::default()
    };

    match cli.command {
        Commands::Index { hosts, quick, path } => {
            overrides.fixture_dir = path;
            let settings = Settings::load(cli.config.as_deref(), &overrides)?;
            cmd_index(&settings, json_mode, &hosts, quick)
        }
        Commands::Facts { hostname, output } => {
            let settings = Settings::load(cli.config.as_deref(), &overrides)?;
            cmd_facts(&settings, &hostname, output.as_deref())
        }
        Commands::Select {
            select,
            reject,
            prefer,
            strict,
            show_facts,
        } => {
            overrides.strict_index = strict;
            let settings = Settings::load(cli.config.as_deref(), &overrides)?;
            let steps = SelectSteps {
                select,
                reject,
                prefer,
            };
            cmd_select(&settings, json_mode, &steps, show_facts)
        }
        Commands::Nodes { full } => {
            let settings = Settings::load(cli.config.as_deref(), &overrides)?;
            cmd_nodes(&settings, json_mode, full)
        }
        Commands::Hash => {
            let settings = Settings::load(cli.config.as_deref(), &overrides)?;
            cmd_hash(&settings, json_mode)
        }
    }
}
