use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Executor;

use redress_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the pool described by the `[database]` config section.
///
/// Every connection gets the same pragma batch: WAL so status reads do not
/// block refund-ledger writes, enforced foreign keys between orders, users,
/// and the refund history, and a busy timeout that outlasts the guarded
/// multi-statement transactions in the repositories.
pub async fn connect(settings: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    pool_options(settings.max_connections, settings.timeout_secs).connect(&settings.url).await
}

/// Single-connection in-memory pool for tests. One connection is
/// load-bearing: an in-memory SQLite database vanishes with the connection
/// that created it.
pub async fn connect_memory() -> Result<DbPool, sqlx::Error> {
    pool_options(1, 5).connect("sqlite::memory:").await
}

fn pool_options(max_connections: u32, timeout_secs: u64) -> SqlitePoolOptions {
    // Zero-valued settings are clamped, not rejected.
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute(
                    "PRAGMA foreign_keys = ON; \
                     PRAGMA journal_mode = WAL; \
                     PRAGMA synchronous = NORMAL; \
                     PRAGMA busy_timeout = 5000;",
                )
                .await?;
                Ok(())
            })
        })
}
