//! Scout Server - REST API for Scout event search jobs
//!
//! This crate provides an HTTP API over the Scout job service:
//!
//! - **Jobs**: Create (deduplicated), poll and cancel search jobs
//! - **Queue**: Inspect the pending queue
//! - **Batch**: Trigger one bounded batch run (admin token required)
//!
//! # API Documentation
//!
//! When running the server, the OpenAPI document is available at
//! `/api-docs/openapi.json`.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod scheduler;
pub mod state;

pub use auth::AdminToken;
pub use config::ServerConfig;
pub use error::ApiError;
pub use router::create_router;
pub use scheduler::spawn_batch_trigger;
pub use state::{AppState, ScoutService};
