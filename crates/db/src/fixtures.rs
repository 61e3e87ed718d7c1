use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Contract for the demo dataset: counts and a handful of rows that the
/// dispatch flows depend on.
const SEED_USER_COUNT: i64 = 3;
const SEED_ORDER_COUNT: i64 = 7;
const SEED_REFUND_COUNT: i64 = 2;

/// Orders the chat demo leans on: (id, owning user, status).
const SEED_KEY_ORDERS: &[(i64, i64, &str)] =
    &[(101, 1, "shipped"), (102, 1, "delivered"), (104, 2, "pending")];

/// Deterministic seed dataset for local runs and end-to-end checks.
pub struct DemoSeedDataset;

#[derive(Debug)]
pub struct SeedResult {
    pub users: i64,
    pub orders: i64,
    pub refunds: i64,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset into an empty database. Loading twice fails on
    /// primary-key conflicts, so callers should `verify` first.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            users: SEED_USER_COUNT,
            orders: SEED_ORDER_COUNT,
            refunds: SEED_REFUND_COUNT,
        })
    }

    /// Check whether the demo dataset is present and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let user_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM users").fetch_one(pool).await?;
        checks.push(("users", user_count == SEED_USER_COUNT));

        let order_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM orders").fetch_one(pool).await?;
        checks.push(("orders", order_count == SEED_ORDER_COUNT));

        let refund_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM refund_history").fetch_one(pool).await?;
        checks.push(("refunds", refund_count == SEED_REFUND_COUNT));

        for (order_id, user_id, status) in SEED_KEY_ORDERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM orders WHERE id = ?1 AND user_id = ?2 AND status = ?3)",
            )
            .bind(order_id)
            .bind(user_id)
            .bind(status)
            .fetch_one(pool)
            .await?;
            checks.push(("key-order", present == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::connect_memory;
    use crate::migrations::run_pending;

    use super::DemoSeedDataset;

    #[tokio::test]
    async fn demo_dataset_loads_and_verifies() {
        let pool = connect_memory().await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let seeded = DemoSeedDataset::load(&pool).await.expect("seed");
        assert_eq!(seeded.orders, 7);

        let verified = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(verified.all_present, "failed checks: {:?}", verified.checks);
    }

    #[tokio::test]
    async fn verify_reports_missing_data_on_empty_database() {
        let pool = connect_memory().await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let verified = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verified.all_present);
    }
}
