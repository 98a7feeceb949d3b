use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use fenestra_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Open a pool using the effective database configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    open(&config.url, config.max_connections, config.timeout_secs).await
}

/// Open a pool for an ad-hoc URL with conservative settings; used by
/// tests against `sqlite::memory:`.
pub async fn connect_url(database_url: &str) -> Result<DbPool, sqlx::Error> {
    open(database_url, 1, 30).await
}

async fn open(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
