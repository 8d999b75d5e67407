//! Scout Core - job orchestration, category cache and batch runner.
//!
//! This crate provides the core functionality for Scout, including:
//!
//! - **Domain models**: [`Job`], [`CategoryState`], [`Progress`], [`EventItem`]
//! - **Deduplication**: [`signature`](signature::signature) fingerprints of search requests
//! - **State machine**: per-category transitions and job status derivation in [`progress`]
//! - **Storage services**: [`JobStore`] and [`CategoryCache`] over any [`KvStore`]
//! - **Processing**: [`CategoryProcessor`] (timeout, retries, per-tuple lock) and the
//!   bounded [`BatchRunner`]
//! - **Entry point**: [`JobService`] for the REST API and CLI
//!
//! # Architecture
//!
//! Everything that talks to the outside world sits behind a trait:
//!
//! - [`KvStore`] - key-value storage with TTLs and a FIFO queue
//!   (e.g. PostgreSQL in `scout-db`, [`MemoryStore`] here)
//! - [`SearchProvider`] - the external event search (e.g. HTTP in `scout-client`)
//! - [`CategoryNormalizer`] - canonical category labels ([`AliasNormalizer`])
//!
//! Services are constructed explicitly and cloned into request handlers;
//! there is no global state.
//!
//! # Example
//!
//! ```ignore
//! use scout_core::{AliasNormalizer, CreateJobRequest, JobService, MemoryStore, ScoutConfig};
//!
//! let service = JobService::new(MemoryStore::new(), provider, AliasNormalizer::builtin(), ScoutConfig::default());
//! let outcome = service
//!     .create_job(CreateJobRequest::new("Berlin", "2024-01-15").with_categories(["Music", "Theater"]))
//!     .await?;
//!
//! // Later, from a scheduler
//! let summary = service.run_batch().await?;
//! let job = service.get_job(outcome.job.id).await?;
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod job;
pub mod job_store;
pub mod memory;
pub mod normalizer;
pub mod processor;
pub mod progress;
pub mod runner;
pub mod service;
pub mod signature;
pub mod traits;

// Configuration
pub use config::{
    CacheConfig, CategoriesConfig, CategoryEntry, HttpConfig, JobStoreConfig, ProcessorConfig,
    RunnerConfig, ScoutConfig, StalenessConfig, default_config_path, load_categories_config,
};

// Error handling
pub use error::{AppError, ServiceErrorDetails, ServiceErrorKind};

// Domain models
pub use job::{
    CategoryState, CategoryStatus, CreateJobOutcome, CreateJobRequest, EventItem, Job, JobStatus,
    JobUpdate, Progress,
};

// Traits for dependency injection
pub use traits::{CategoryNormalizer, KvStore, SearchProvider, SearchQuery};

// Implementations shipped with the core
pub use memory::MemoryStore;
pub use normalizer::{AliasNormalizer, IdentityNormalizer};

// Services (generic over trait implementations)
pub use cache::{CacheEntry, CacheLookup, CategoryCache};
pub use job_store::JobStore;
pub use processor::CategoryProcessor;
pub use service::{CategorySummary, JobService, JobSummary};

// Batch runner
pub use runner::{
    BatchRunner, RunSummary, RunnerEvent, RunnerReporter, SilentRunnerReporter,
    TracingRunnerReporter,
};
