use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// What one `run_pending` call did to the schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    pub newly_applied: usize,
    pub total_applied: usize,
    pub latest_version: Option<i64>,
}

pub async fn run_pending(pool: &DbPool) -> Result<MigrationReport, MigrateError> {
    let before = applied_versions(pool).await?.len();
    MIGRATOR.run(pool).await?;
    let versions = applied_versions(pool).await?;
    Ok(MigrationReport {
        newly_applied: versions.len().saturating_sub(before),
        total_applied: versions.len(),
        latest_version: versions.last().copied(),
    })
}

/// Versions recorded in `_sqlx_migrations`, oldest first. An absent
/// bookkeeping table means a fresh database with nothing applied yet.
async fn applied_versions(pool: &DbPool) -> Result<Vec<i64>, sqlx::Error> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if table_exists == 0 {
        return Ok(Vec::new());
    }
    sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_memory;

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_memory().await.expect("connect");
        let report = run_pending(&pool).await.expect("run migrations");
        assert!(report.newly_applied >= 1);
        assert_eq!(report.newly_applied, report.total_applied);

        for table in ["users", "orders", "refund_history"] {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");
            assert_eq!(count, 1, "expected `{table}` table after migration");
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn second_run_applies_nothing_new() {
        let pool = connect_memory().await.expect("connect");
        let first = run_pending(&pool).await.expect("first run");
        let second = run_pending(&pool).await.expect("second run");

        assert_eq!(second.newly_applied, 0);
        assert_eq!(second.total_applied, first.total_applied);
        assert_eq!(second.latest_version, first.latest_version);
        pool.close().await;
    }
}
