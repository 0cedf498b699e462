//! # cardgraph CLI Module
//!
//! This module implements the CLI interface for cardgraph.
//!
//! ## Available Commands
//!
//! - `run` - Load nodes, then link purchases (default)
//! - `nodes` - Load customer and merchant nodes only
//! - `link` - Link purchases between existing nodes only
//! - `status` - Show node and relationship counts of the store

mod commands;

use crate::config::{Overrides, Settings};
use crate::prompt;
use cardgraph_core::CardGraphError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// cardgraph - card transactions into a property graph
///
/// Customers and merchants become nodes merged on their keys; every
/// purchase becomes a relationship between them.
#[derive(Parser, Debug)]
#[command(name = "cardgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Transaction dataset (CSV with a header row)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Graph store: "neo4j", "redb" (embedded file) or "memory" (dry run)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Path to the redb database file
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Neo4j Bolt URI
    #[arg(long, global = true)]
    pub uri: Option<String>,

    /// Neo4j user
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Neo4j password
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Answer "yes" to every reset prompt
    #[arg(short, long, global = true, conflicts_with = "no")]
    pub yes: bool,

    /// Answer "no" to every reset prompt
    #[arg(short, long, global = true)]
    pub no: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Load nodes, then link purchases
    Run {
        /// Relationship type to create
        #[arg(short, long)]
        relation: Option<String>,
    },

    /// Load customer and merchant nodes
    Nodes,

    /// Link purchases between loaded nodes
    Link {
        /// Relationship type to create
        #[arg(short, long)]
        relation: Option<String>,
    },

    /// Show store counts
    Status {
        /// Relationship type to count
        #[arg(short, long)]
        relation: Option<String>,
    },
}

impl Cli {
    /// Command line values that override configuration.
    pub fn overrides(&self) -> Overrides {
        let relation = match &self.command {
            Some(
                Commands::Run { relation }
                | Commands::Link { relation }
                | Commands::Status { relation },
            ) => relation.clone(),
            Some(Commands::Nodes) | None => None,
        };
        Overrides {
            dataset: self.file.clone(),
            backend: self.backend.clone(),
            database: self.database.clone(),
            uri: self.uri.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            relation,
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CardGraphError> {
    let settings = Settings::load(cli.config.as_deref(), &cli.overrides())?;
    let json_mode = cli.json_mode;
    let prompter = prompt::prompter(cli.yes, cli.no);

    tracing::debug!(?settings, "resolved settings");

    match cli.command {
        Some(Commands::Run { .. }) | None => {
            cmd_run(settings, prompter, Steps::All, json_mode).await
        }
        Some(Commands::Nodes) => cmd_run(settings, prompter, Steps::Nodes, json_mode).await,
        Some(Commands::Link { .. }) => cmd_run(settings, prompter, Steps::Link, json_mode).await,
        Some(Commands::Status { .. }) => cmd_status(settings, json_mode).await,
    }
}
