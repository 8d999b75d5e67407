use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scout_cli::{Command, Config};
use scout_client::HttpSearchProvider;
use scout_core::traits::{SearchProvider, SearchQuery};
use scout_core::{
    AliasNormalizer, AppError, CreateJobRequest, EventItem, Job, JobService, JobSummary,
    ScoutConfig, TracingRunnerReporter, load_categories_config,
};
use scout_db::StoreBackend;

/// Stand-in provider for commands that never search.
#[derive(Debug, Clone, Copy)]
struct NoSearchProvider;

impl SearchProvider for NoSearchProvider {
    async fn search(
        &self,
        _query: &SearchQuery,
        _cancel: CancellationToken,
    ) -> Result<Vec<EventItem>, AppError> {
        Err(AppError::ConfigError(
            "search provider is not configured".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::parse();

    info!(store = %config.store, "Opening storage...");
    let store = StoreBackend::open(config.store, config.database_url.as_deref(), 5)
        .await
        .context("Failed to open storage")?;

    let categories_config = if let Some(path) = &config.categories_config {
        load_categories_config(Some(path.clone()))?
    } else {
        load_categories_config(None).unwrap_or(None)
    };
    let normalizer = categories_config
        .as_ref()
        .map(AliasNormalizer::with_config)
        .unwrap_or_else(AliasNormalizer::builtin);

    let scout_config = ScoutConfig::from_env();
    scout_config
        .validate()
        .context("Invalid runner configuration")?;

    if config.command.needs_search_provider() {
        let endpoint = config
            .search_endpoint
            .as_deref()
            .context("--search-endpoint (SCOUT_SEARCH_ENDPOINT) is required for run-batch")?;
        let api_key = config
            .search_api_key
            .as_deref()
            .context("--search-api-key (SCOUT_SEARCH_API_KEY) is required for run-batch")?;
        let provider = HttpSearchProvider::new(endpoint, api_key)
            .context("Failed to initialize search provider")?;
        let service = JobService::new(store, provider, normalizer, scout_config);
        execute(&service, config.command).await
    } else {
        let service = JobService::new(store, NoSearchProvider, normalizer, scout_config);
        execute(&service, config.command).await
    }
}

async fn execute<P: SearchProvider>(
    service: &JobService<StoreBackend, P, AliasNormalizer>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Create {
            location,
            date,
            categories,
            ttl_seconds,
        } => {
            let mut request = CreateJobRequest::new(location, date).with_categories(categories);
            if let Some(ttl) = ttl_seconds {
                request = request.with_ttl_seconds(ttl);
            }
            let outcome = service
                .create_job(request)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            let verb = if outcome.is_new {
                if outcome.is_stale {
                    "Replaced stale job with"
                } else {
                    "Created"
                }
            } else {
                "Found existing"
            };
            println!("{} job {}", verb, outcome.job.id);
            print_summary(&JobSummary::from(&outcome.job));
        }
        Command::Status { id, json } => {
            let job = service
                .get_job(id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                print_summary(&JobSummary::from(&job));
                print_results(&job);
            }
        }
        Command::Cancel { id } => {
            let job = service
                .cancel_job(id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Cancelled job {}", job.id);
        }
        Command::RunBatch => {
            let summary = service
                .run_batch_cancellable(CancellationToken::new(), &TracingRunnerReporter)
                .await?;
            if summary.started {
                println!(
                    "Processed {} job(s) in {} ms",
                    summary.processed_jobs, summary.duration_ms
                );
            } else {
                println!("Another batch runner is active, nothing done");
            }
        }
        Command::Queue => {
            let pending = service.queue_length().await?;
            println!("Pending jobs: {}", pending);
        }
        Command::Purge => {
            let purged = service.jobs().kv().purge_expired().await?;
            println!("Purged {} expired row(s)", purged);
        }
    }

    Ok(())
}

fn print_summary(summary: &JobSummary) {
    println!();
    println!("  Status:       {}", summary.status);
    println!("  Location:     {}", summary.location);
    println!("  Date:         {}", summary.date);
    println!(
        "  Categories:   {} done, {} failed, {} total",
        summary.completed_categories, summary.failed_categories, summary.total_categories
    );
    for category in &summary.categories {
        let found = category
            .result_count
            .map(|n| format!(" ({} events)", n))
            .unwrap_or_default();
        println!("    {:<20} {}{}", category.name, category.state, found);
        if let Some(err) = &category.error {
            println!("      last error: {}", err);
        }
    }
    println!("  Results:      {}", summary.result_count);
    if let Some(err) = &summary.error {
        println!("  Error:        {}", err);
    }
    println!();
}

fn print_results(job: &Job) {
    for (i, event) in job.results.iter().enumerate() {
        let when = event.start_date_time.as_deref().unwrap_or("time tba");
        let venue = event.venue_name.as_deref().unwrap_or("venue tba");
        println!("{}. [{}] {}", i + 1, event.category, event.title);
        println!("   {} @ {}", when, venue);
    }
}
