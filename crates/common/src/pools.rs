//! Connection setup for the document store and the dedupe cache.

use std::time::Duration;

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a PostgreSQL connection pool for the document store.
///
/// Pass `AppConfig::db_max_connections` for the user-configured size (default 10).
pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Connected to PostgreSQL document store");
    Ok(pool)
}

/// Open a Redis connection manager if a URL is configured.
///
/// The manager reconnects on its own, so one handle is shared by every invocation.
pub async fn connect_redis(redis_url: Option<&str>) -> anyhow::Result<Option<ConnectionManager>> {
    let Some(url) = redis_url else {
        tracing::info!("REDIS_URL not set, duplicate trigger filtering disabled");
        return Ok(None);
    };

    let client = redis::Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!("Connected to Redis");
    Ok(Some(manager))
}
