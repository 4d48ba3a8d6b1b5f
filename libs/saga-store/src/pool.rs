use std::time::Duration;

use saga_config::DatabaseSettings;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Build the process-wide Postgres pool from resolved settings.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "Connecting to Postgres"
    );

    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
        .connect(&settings.url)
        .await
}
