use clap::Parser;
use scout_db::StoreKind;
use std::path::PathBuf;

/// Server configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "scout-server")]
#[command(author, version, about = "REST API server for Scout event search jobs")]
pub struct ServerConfig {
    /// Storage backend: postgres or memory
    #[arg(long, env = "SCOUT_STORE", default_value = "postgres")]
    pub store: StoreKind,

    /// PostgreSQL database connection URL (required for the postgres store)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Maximum database connections
    #[arg(long, env = "SCOUT_DB_MAX_CONNECTIONS", default_value = "10")]
    pub max_connections: u32,

    /// Search provider endpoint URL
    #[arg(long, env = "SCOUT_SEARCH_ENDPOINT")]
    pub search_endpoint: String,

    /// Search provider API key
    #[arg(long, env = "SCOUT_SEARCH_API_KEY", hide_env_values = true)]
    pub search_api_key: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bearer token for admin endpoints (batch trigger). Admin endpoints are
    /// disabled when unset.
    #[arg(long, env = "SCOUT_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Run a batch pass every N seconds. Disabled when unset.
    #[arg(long, env = "SCOUT_BATCH_INTERVAL_SECS")]
    pub batch_interval_secs: Option<u64>,

    /// Allowed CORS origins, comma separated, or "*"
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Path to categories.toml configuration file
    #[arg(long, env = "SCOUT_CATEGORIES_CONFIG")]
    pub categories_config: Option<PathBuf>,
}
