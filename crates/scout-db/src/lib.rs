//! Scout DB - PostgreSQL storage layer
//!
//! This crate provides the persistent [`KvStore`](scout_core::KvStore)
//! implementation used in production.
//!
//! # Overview
//!
//! The main components are:
//! - [`PgStore`] - keys with TTLs and FIFO queues in two PostgreSQL tables
//! - [`StoreBackend`] - runtime choice between PostgreSQL and the in-memory store

mod backend;
mod pg_store;

pub use backend::{StoreBackend, StoreKind};
pub use pg_store::{MIGRATIONS, PgStore};
