//! Configuration types for Scout components.
//!
//! Every struct has sensible defaults and a `from_env()` constructor that
//! overrides individual fields from `SCOUT_*` environment variables.
//! Unparseable values fall back to the default with a warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

// =============================================================================
// Job Store Configuration
// =============================================================================

/// Thresholds after which an existing job no longer satisfies a new
/// identical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessConfig {
    /// Any job older than this (since creation) is stale.
    pub stale_after: Duration,
    /// SUCCESS, FAILED and CANCELLED jobs older than this are stale.
    pub terminal_stale_after: Duration,
    /// RUNNING jobs without an update for this long are presumed dead.
    pub running_watchdog: Duration,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30 * 60),
            terminal_stale_after: Duration::from_secs(5 * 60),
            running_watchdog: Duration::from_secs(10 * 60),
        }
    }
}

impl StalenessConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stale_after: env_secs("SCOUT_STALE_AFTER_SECS").unwrap_or(defaults.stale_after),
            terminal_stale_after: env_secs("SCOUT_TERMINAL_STALE_AFTER_SECS")
                .unwrap_or(defaults.terminal_stale_after),
            running_watchdog: env_secs("SCOUT_RUNNING_WATCHDOG_SECS")
                .unwrap_or(defaults.running_watchdog),
        }
    }
}

/// Job store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStoreConfig {
    /// Default lifetime of a job record.
    pub job_ttl: Duration,
    pub staleness: StalenessConfig,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self {
            job_ttl: Duration::from_secs(3600),
            staleness: StalenessConfig::default(),
        }
    }
}

impl JobStoreConfig {
    pub fn from_env() -> Self {
        Self {
            job_ttl: env_secs("SCOUT_JOB_TTL_SECS").unwrap_or(Duration::from_secs(3600)),
            staleness: StalenessConfig::from_env(),
        }
    }

    pub fn with_job_ttl(mut self, ttl: Duration) -> Self {
        self.job_ttl = ttl;
        self
    }

    pub fn with_staleness(mut self, staleness: StalenessConfig) -> Self {
        self.staleness = staleness;
        self
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

/// Category cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of a cached category result set.
    pub entry_ttl: Duration,
    /// Lifetime of a per-tuple lock if its holder never releases it.
    pub lock_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(6 * 3600),
            lock_ttl: Duration::from_secs(90),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            entry_ttl: env_secs("SCOUT_CACHE_TTL_SECS").unwrap_or(defaults.entry_ttl),
            lock_ttl: env_secs("SCOUT_CACHE_LOCK_TTL_SECS").unwrap_or(defaults.lock_ttl),
        }
    }

    pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }
}

// =============================================================================
// Processor Configuration
// =============================================================================

/// Category processor configuration: timeout and retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Upper bound for a single search provider call.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay, doubled after every attempt.
    pub retry_delay: Duration,
    /// Add up to 25% random jitter to each backoff.
    pub jitter: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl ProcessorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: env_millis("SCOUT_CATEGORY_TIMEOUT_MS").unwrap_or(defaults.timeout),
            max_retries: env_parse("SCOUT_CATEGORY_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay: env_millis("SCOUT_RETRY_DELAY_MS").unwrap_or(defaults.retry_delay),
            jitter: defaults.jitter,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Backoff before retry number `attempt + 1`, jitter excluded.
    ///
    /// # Examples
    ///
    /// ```
    /// use scout_core::ProcessorConfig;
    /// use std::time::Duration;
    ///
    /// let config = ProcessorConfig::default().with_retry_delay(Duration::from_millis(100));
    /// assert_eq!(config.backoff(0), Duration::from_millis(100));
    /// assert_eq!(config.backoff(2), Duration::from_millis(400));
    /// ```
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    /// Longest one category can take: every attempt timing out plus every
    /// backoff at its largest jitter.
    pub fn worst_case_category_time(&self) -> Duration {
        let attempts = self.timeout.saturating_mul(self.max_retries.saturating_add(1));
        (0..self.max_retries).fold(attempts, |total, attempt| {
            let delay = self.backoff(attempt);
            let delay = if self.jitter {
                delay.saturating_add(delay / 4)
            } else {
                delay
            };
            total.saturating_add(delay)
        })
    }
}

// =============================================================================
// Runner Configuration
// =============================================================================

/// Bounds for a single batch runner pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Stop after this many jobs.
    pub max_jobs_per_run: usize,
    /// Do not start another job once this much time has elapsed.
    pub max_run: Duration,
    /// Lifetime of the global runner lock.
    pub lock_ttl: Duration,
    /// How often the global lock is refreshed during a pass.
    pub extend_lock_every: Duration,
    /// Skip dequeued jobs that are already RUNNING.
    pub skip_running: bool,
    /// Pause between two category searches of the same job.
    pub category_pacing: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_jobs_per_run: 5,
            max_run: Duration::from_secs(50),
            lock_ttl: Duration::from_secs(120),
            extend_lock_every: Duration::from_secs(30),
            skip_running: true,
            category_pacing: Duration::from_millis(250),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_jobs_per_run: env_parse("SCOUT_MAX_JOBS_PER_RUN")
                .unwrap_or(defaults.max_jobs_per_run),
            max_run: env_millis("SCOUT_MAX_RUN_MS").unwrap_or(defaults.max_run),
            lock_ttl: env_millis("SCOUT_RUNNER_LOCK_TTL_MS").unwrap_or(defaults.lock_ttl),
            extend_lock_every: env_millis("SCOUT_EXTEND_LOCK_EVERY_MS")
                .unwrap_or(defaults.extend_lock_every),
            ..defaults
        }
    }

    pub fn with_max_jobs_per_run(mut self, max: usize) -> Self {
        self.max_jobs_per_run = max;
        self
    }

    pub fn with_max_run(mut self, max_run: Duration) -> Self {
        self.max_run = max_run;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_extend_lock_every(mut self, every: Duration) -> Self {
        self.extend_lock_every = every;
        self
    }

    pub fn with_skip_running(mut self, skip: bool) -> Self {
        self.skip_running = skip;
        self
    }

    pub fn with_category_pacing(mut self, pacing: Duration) -> Self {
        self.category_pacing = pacing;
        self
    }

    /// Checks that the global lock outlives the slowest single category and
    /// is refreshed before it lapses.
    pub fn validate(&self, processor: &ProcessorConfig) -> Result<(), AppError> {
        let category = processor.worst_case_category_time();
        if self.lock_ttl <= category {
            return Err(AppError::ConfigError(format!(
                "runner lock TTL ({:?}) must exceed the worst-case category time ({:?})",
                self.lock_ttl, category
            )));
        }
        if self.extend_lock_every >= self.lock_ttl {
            return Err(AppError::ConfigError(format!(
                "runner lock refresh interval ({:?}) must be shorter than its TTL ({:?})",
                self.extend_lock_every, self.lock_ttl
            )));
        }
        Ok(())
    }
}

/// All core settings in one place.
#[derive(Debug, Clone, Default)]
pub struct ScoutConfig {
    pub job_store: JobStoreConfig,
    pub cache: CacheConfig,
    pub processor: ProcessorConfig,
    pub runner: RunnerConfig,
}

impl ScoutConfig {
    pub fn from_env() -> Self {
        Self {
            job_store: JobStoreConfig::from_env(),
            cache: CacheConfig::from_env(),
            processor: ProcessorConfig::from_env(),
            runner: RunnerConfig::from_env(),
        }
    }

    /// Rejects combinations that would let a runner lose its lock mid-job.
    pub fn validate(&self) -> Result<(), AppError> {
        self.runner.validate(&self.processor)
    }

    pub fn with_job_store(mut self, config: JobStoreConfig) -> Self {
        self.job_store = config;
        self
    }

    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn with_processor(mut self, config: ProcessorConfig) -> Self {
        self.processor = config;
        self
    }

    pub fn with_runner(mut self, config: RunnerConfig) -> Self {
        self.runner = config;
        self
    }
}

/// HTTP client configuration for the search provider.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Category Configuration (categories.toml)
// =============================================================================

/// Root structure of `categories.toml`.
///
/// # Example
///
/// ```toml
/// [[categories]]
/// name = "Live Music"
/// aliases = ["gigs", "konzerte"]
///
/// [[categories]]
/// name = "Food & Drink"
/// aliases = ["kulinarik", "essen"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoriesConfig {
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
}

/// One canonical category and the labels that map to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    /// Canonical label.
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "categories.toml";

/// Returns the default configuration directory path: `~/.config/scout/`
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("scout"))
}

/// Returns the default configuration file path.
///
/// Path: `~/.config/scout/categories.toml`
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

/// Load category aliases from a TOML file.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No file at the default path
/// * `Err(e)` - An explicit path does not exist, or the file is invalid
pub fn load_categories_config(path: Option<PathBuf>) -> Result<Option<CategoriesConfig>, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            tracing::debug!(path = %config_path.display(), "No categories file, using built-in aliases");
            return Ok(None);
        }
        return Err(AppError::ConfigError(format!(
            "Config file not found: {}",
            config_path.display()
        )));
    }

    read_categories_file(&config_path).map(Some)
}

fn read_categories_file(path: &Path) -> Result<CategoriesConfig, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!("Invalid TOML in '{}': {}", path.display(), e))
    })
}
