//! Test utilities for integration tests.
//!
//! Provides a helper to set up an isolated PostgreSQL container per test
//! and a canned search provider.

use scout_core::traits::{SearchProvider, SearchQuery};
use scout_core::{AppError, EventItem};
use scout_db::PgStore;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio_util::sync::CancellationToken;

/// Sets up a PostgreSQL container and returns a migrated store.
///
/// Each call creates a fresh, isolated database container. The container is
/// automatically cleaned up when the returned `ContainerAsync` is dropped.
///
/// # Returns
///
/// A tuple of (PgStore, ContainerAsync) - keep the container alive for the test duration.
pub async fn setup_test_store() -> (PgStore, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "postgres")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    // The server restarts once during init, so retry until it accepts connections
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!(
                        "Failed to connect to database after {} retries: {}",
                        MAX_RETRIES, e
                    );
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    let store = PgStore::new(pool);
    store.migrate().await.expect("Failed to run migrations");
    (store, container)
}

/// Provider returning one event for every category.
#[derive(Clone, Default)]
pub struct OneEventProvider;

impl SearchProvider for OneEventProvider {
    async fn search(
        &self,
        query: &SearchQuery,
        _cancel: CancellationToken,
    ) -> Result<Vec<EventItem>, AppError> {
        Ok(vec![EventItem::new(
            format!("{} in {}", query.category, query.location),
            query.category.clone(),
        )])
    }
}
