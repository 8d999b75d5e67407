//! HTTP request handlers for API endpoints.

pub mod batch;
pub mod health;
pub mod jobs;
pub mod queue;
