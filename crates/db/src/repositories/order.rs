use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use redress_core::domain::order::{Order, OrderId, OrderStatus};
use redress_core::domain::user::UserId;

use super::{product_matches, NewOrder, OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T, E: std::fmt::Display>(result: Result<T, E>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{raw}`: {e}")))
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: i64 = decode(row.try_get("id"))?;
    let user_id: i64 = decode(row.try_get("user_id"))?;
    let product_id: i64 = decode(row.try_get("product_id"))?;
    let product_name: Option<String> = decode(row.try_get("product_name"))?;
    let amount_str: String = decode(row.try_get("amount"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let order_date_str: String = decode(row.try_get("order_date"))?;
    let shipping_address: Option<String> = decode(row.try_get("shipping_address"))?;
    let replacement_of: Option<i64> = decode(row.try_get("replacement_of"))?;

    let amount: Decimal = amount_str
        .parse()
        .map_err(|e| RepositoryError::Decode(format!("bad amount `{amount_str}`: {e}")))?;
    let status = OrderStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status_str}`")))?;

    Ok(Order {
        id: OrderId(id),
        user_id: UserId(user_id),
        product_id,
        product_name,
        amount,
        status,
        order_date: parse_timestamp(&order_date_str)?,
        shipping_address,
        replacement_of: replacement_of.map(OrderId),
    })
}

const ORDER_COLUMNS: &str =
    "id, user_id, product_id, product_name, amount, status, order_date, shipping_address, replacement_of";

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_order(r)?)),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? ORDER BY order_date DESC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn search_for_user(
        &self,
        user_id: UserId,
        terms: &[String],
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders \
                     WHERE user_id = ? AND product_name IS NOT NULL AND status = ? \
                     ORDER BY order_date DESC"
                ))
                .bind(user_id.0)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders \
                     WHERE user_id = ? AND product_name IS NOT NULL \
                     ORDER BY order_date DESC"
                ))
                .bind(user_id.0)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut matches = Vec::new();
        for row in &rows {
            let order = row_to_order(row)?;
            let name_matches =
                order.product_name.as_deref().is_some_and(|name| product_matches(name, terms));
            if name_matches {
                matches.push(order);
            }
        }
        Ok(matches)
    }

    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO orders \
             (user_id, product_id, product_name, amount, status, order_date, shipping_address, replacement_of) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.user_id.0)
        .bind(order.product_id)
        .bind(&order.product_name)
        .bind(order.amount.to_string())
        .bind(order.status.as_str())
        .bind(order.order_date.to_rfc3339())
        .bind(&order.shipping_address)
        .bind(order.replacement_of.map(|id| id.0))
        .execute(&self.pool)
        .await?;

        Ok(Order {
            id: OrderId(result.last_insert_rowid()),
            user_id: order.user_id,
            product_id: order.product_id,
            product_name: order.product_name,
            amount: order.amount,
            status: order.status,
            order_date: order.order_date,
            shipping_address: order.shipping_address,
            replacement_of: order.replacement_of,
        })
    }

    async fn transition_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ?")
            .bind(next.as_str())
            .bind(id.0)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_replacement(
        &self,
        original: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ? AND status = 'shipped'"
        ))
        .bind(original.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(ref original_row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let original_order = row_to_order(original_row)?;

        let result = sqlx::query(
            "INSERT INTO orders \
             (user_id, product_id, product_name, amount, status, order_date, shipping_address, replacement_of) \
             VALUES (?, ?, ?, '0', 'pending', ?, ?, ?)",
        )
        .bind(original_order.user_id.0)
        .bind(original_order.product_id)
        .bind(&original_order.product_name)
        .bind(now.to_rfc3339())
        .bind(&original_order.shipping_address)
        .bind(original.0)
        .execute(&mut *tx)
        .await?;

        let replacement_id = result.last_insert_rowid();
        tx.commit().await?;

        Ok(Some(Order {
            id: OrderId(replacement_id),
            user_id: original_order.user_id,
            product_id: original_order.product_id,
            product_name: original_order.product_name,
            amount: Decimal::ZERO,
            status: OrderStatus::Pending,
            order_date: now,
            shipping_address: original_order.shipping_address,
            replacement_of: Some(original),
        }))
    }

    async fn count_recent_shipped(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        exclude: OrderId,
    ) -> Result<u32, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders \
             WHERE user_id = ? AND status = 'shipped' AND order_date >= ? AND id != ?",
        )
        .bind(user_id.0)
        .bind(since.to_rfc3339())
        .bind(exclude.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }
}
