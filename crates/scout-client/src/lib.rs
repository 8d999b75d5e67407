//! Scout Client - HTTP clients for external APIs
//!
//! This crate provides the HTTP implementation of the
//! [`SearchProvider`](scout_core::SearchProvider) contract:
//!
//! - [`search`] - JSON event search endpoint with bearer authentication
//!
//! # Overview
//!
//! The client handles authentication, request building, response parsing,
//! and folds every failure into a [`ServiceErrorKind`](scout_core::ServiceErrorKind)
//! so the category processor can decide whether to retry.

pub mod search;

pub use search::HttpSearchProvider;
