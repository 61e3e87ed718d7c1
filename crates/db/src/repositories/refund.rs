use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use redress_core::domain::order::OrderStatus;
use redress_core::domain::refund::{RefundId, RefundRecord};
use redress_core::domain::user::UserId;

use super::{NewRefund, RefundRepository, RepositoryError};
use crate::DbPool;

pub struct SqlRefundRepository {
    pool: DbPool,
}

impl SqlRefundRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T, E: std::fmt::Display>(result: Result<T, E>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_refund(row: &sqlx::sqlite::SqliteRow) -> Result<RefundRecord, RepositoryError> {
    let id: i64 = decode(row.try_get("id"))?;
    let user_id: i64 = decode(row.try_get("user_id"))?;
    let order_id: i64 = decode(row.try_get("order_id"))?;
    let amount_str: String = decode(row.try_get("amount"))?;
    let reason: String = decode(row.try_get("reason"))?;
    let refund_date_str: String = decode(row.try_get("refund_date"))?;
    let is_fraudulent: i64 = decode(row.try_get("is_fraudulent"))?;

    let amount: Decimal = amount_str
        .parse()
        .map_err(|e| RepositoryError::Decode(format!("bad amount `{amount_str}`: {e}")))?;
    let refund_date = DateTime::parse_from_rfc3339(&refund_date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{refund_date_str}`: {e}")))?;

    Ok(RefundRecord {
        id: RefundId(id),
        user_id: UserId(user_id),
        order_id: redress_core::domain::order::OrderId(order_id),
        amount,
        reason,
        refund_date,
        is_fraudulent: is_fraudulent != 0,
    })
}

#[async_trait::async_trait]
impl RefundRepository for SqlRefundRepository {
    async fn count_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refund_history WHERE user_id = ? AND refund_date >= ?",
        )
        .bind(user_id.0)
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }

    async fn append_within_limit(
        &self,
        refund: NewRefund,
        window_start: DateTime<Utc>,
        max_in_window: u32,
        cancel_order_from: Option<OrderStatus>,
    ) -> Result<Option<RefundRecord>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Count and insert must see the same ledger state; the transaction
        // holds the sqlite write lock for both.
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refund_history WHERE user_id = ? AND refund_date >= ?",
        )
        .bind(refund.user_id.0)
        .bind(window_start.to_rfc3339())
        .fetch_one(&mut *tx)
        .await?;

        if count as u32 >= max_in_window {
            tx.rollback().await?;
            return Ok(None);
        }

        let result = sqlx::query(
            "INSERT INTO refund_history (user_id, order_id, amount, reason, refund_date, is_fraudulent) \
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(refund.user_id.0)
        .bind(refund.order_id.0)
        .bind(refund.amount.to_string())
        .bind(&refund.reason)
        .bind(refund.refund_date.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let refund_id = result.last_insert_rowid();

        if let Some(from) = cancel_order_from {
            sqlx::query("UPDATE orders SET status = 'cancelled' WHERE id = ? AND status = ?")
                .bind(refund.order_id.0)
                .bind(from.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(Some(RefundRecord {
            id: RefundId(refund_id),
            user_id: refund.user_id,
            order_id: refund.order_id,
            amount: refund.amount,
            reason: refund.reason,
            refund_date: refund.refund_date,
            is_fraudulent: false,
        }))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<RefundRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, order_id, amount, reason, refund_date, is_fraudulent \
             FROM refund_history WHERE user_id = ? ORDER BY refund_date DESC",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_refund).collect()
    }
}
