use clap::{Parser, Subcommand};
use scout_db::StoreKind;
use std::path::PathBuf;
use uuid::Uuid;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "scout")]
#[command(author, version, about = "Deduplicated event search jobs")]
#[command(after_help = "Examples:
  scout create Berlin 2024-01-15 -c \"Live Music\" -c Theater
  scout status 6f1c0a6e-2d1b-4c55-9a59-5b3c1e0d7f42 --json
  scout run-batch
  scout queue

Storage:
  SCOUT_STORE=postgres (default) - PostgreSQL via DATABASE_URL
  SCOUT_STORE=memory             - process-local, only useful for trying things out")]
pub struct Config {
    /// Storage backend: postgres or memory
    #[arg(long, env = "SCOUT_STORE", default_value = "postgres")]
    pub store: StoreKind,

    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Search provider endpoint URL (required for run-batch)
    #[arg(long, env = "SCOUT_SEARCH_ENDPOINT")]
    pub search_endpoint: Option<String>,

    /// Search provider API key (required for run-batch)
    #[arg(long, env = "SCOUT_SEARCH_API_KEY", hide_env_values = true)]
    pub search_api_key: Option<String>,

    /// Path to categories.toml configuration file
    #[arg(long, env = "SCOUT_CATEGORIES_CONFIG")]
    pub categories_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a search job, or find the identical one already queued
    #[command(after_help = "Example: scout create Berlin 2024-01-15 -c Konzerte -c Theatre")]
    Create {
        /// Location to search
        location: String,
        /// Event date (YYYY-MM-DD)
        date: String,
        /// Category to search; repeat for several
        #[arg(short, long = "category", value_name = "CATEGORY", required = true)]
        categories: Vec<String>,
        /// Job lifetime in seconds
        #[arg(long)]
        ttl_seconds: Option<u64>,
    },
    /// Show a job's status, progress and results
    Status {
        /// Job UUID
        id: Uuid,
        /// Print the raw job record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel a pending or running job
    Cancel {
        /// Job UUID
        id: Uuid,
    },
    /// Run one bounded batch pass over the pending queue
    RunBatch,
    /// Show the number of queued jobs
    Queue,
    /// Delete expired rows from storage
    Purge,
}

impl Command {
    /// Whether the command calls the search provider.
    pub fn needs_search_provider(&self) -> bool {
        matches!(self, Command::RunBatch)
    }
}
