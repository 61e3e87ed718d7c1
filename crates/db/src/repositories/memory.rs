use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use redress_core::domain::order::{Order, OrderId, OrderStatus};
use redress_core::domain::refund::{RefundId, RefundRecord};
use redress_core::domain::user::UserId;

use super::{product_matches, NewOrder, NewRefund, OrderRepository, RefundRepository, RepositoryError};

/// In-memory fake for handler and runtime tests; mirrors the SQL
/// repository's guarded-mutation semantics.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<i64, Order>>,
    next_id: AtomicI64,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self { orders: RwLock::new(HashMap::new()), next_id: AtomicI64::new(1000) }
    }

    pub async fn seed(&self, order: Order) {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.0, order);
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn set_status_if(&self, id: OrderId, expected: OrderStatus, next: OrderStatus) -> bool {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id.0) {
            Some(order) if order.status == expected => {
                order.status = next;
                true
            }
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> =
            orders.values().filter(|order| order.user_id == user_id).cloned().collect();
        found.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(found)
    }

    async fn search_for_user(
        &self,
        user_id: UserId,
        terms: &[String],
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|order| {
                order.user_id == user_id
                    && status.map_or(true, |wanted| order.status == wanted)
                    && order.product_name.as_deref().map_or(false, |name| product_matches(name, terms))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(found)
    }

    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let inserted = Order {
            id: OrderId(self.allocate_id()),
            user_id: order.user_id,
            product_id: order.product_id,
            product_name: order.product_name,
            amount: order.amount,
            status: order.status,
            order_date: order.order_date,
            shipping_address: order.shipping_address,
            replacement_of: order.replacement_of,
        };
        let mut orders = self.orders.write().await;
        orders.insert(inserted.id.0, inserted.clone());
        Ok(inserted)
    }

    async fn transition_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        Ok(self.set_status_if(id, expected, next).await)
    }

    async fn create_replacement(
        &self,
        original: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut orders = self.orders.write().await;
        let Some(original_order) = orders.get(&original.0).cloned() else {
            return Ok(None);
        };
        if original_order.status != OrderStatus::Shipped {
            return Ok(None);
        }

        let replacement = Order {
            id: OrderId(self.allocate_id()),
            user_id: original_order.user_id,
            product_id: original_order.product_id,
            product_name: original_order.product_name.clone(),
            amount: Decimal::ZERO,
            status: OrderStatus::Pending,
            order_date: now,
            shipping_address: original_order.shipping_address.clone(),
            replacement_of: Some(original),
        };
        orders.insert(replacement.id.0, replacement.clone());
        Ok(Some(replacement))
    }

    async fn count_recent_shipped(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        exclude: OrderId,
    ) -> Result<u32, RepositoryError> {
        let orders = self.orders.read().await;
        let count = orders
            .values()
            .filter(|order| {
                order.user_id == user_id
                    && order.status == OrderStatus::Shipped
                    && order.order_date >= since
                    && order.id != exclude
            })
            .count();
        Ok(count as u32)
    }
}

pub struct InMemoryRefundRepository {
    refunds: RwLock<Vec<RefundRecord>>,
    next_id: AtomicI64,
    orders: Arc<InMemoryOrderRepository>,
}

impl InMemoryRefundRepository {
    pub fn new(orders: Arc<InMemoryOrderRepository>) -> Self {
        Self { refunds: RwLock::new(Vec::new()), next_id: AtomicI64::new(0), orders }
    }
}

#[async_trait::async_trait]
impl RefundRepository for InMemoryRefundRepository {
    async fn count_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let refunds = self.refunds.read().await;
        let count = refunds
            .iter()
            .filter(|refund| refund.user_id == user_id && refund.refund_date >= since)
            .count();
        Ok(count as u32)
    }

    async fn append_within_limit(
        &self,
        refund: NewRefund,
        window_start: DateTime<Utc>,
        max_in_window: u32,
        cancel_order_from: Option<OrderStatus>,
    ) -> Result<Option<RefundRecord>, RepositoryError> {
        let mut refunds = self.refunds.write().await;
        let in_window = refunds
            .iter()
            .filter(|existing| {
                existing.user_id == refund.user_id && existing.refund_date >= window_start
            })
            .count() as u32;
        if in_window >= max_in_window {
            return Ok(None);
        }

        let record = RefundRecord {
            id: RefundId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            user_id: refund.user_id,
            order_id: refund.order_id,
            amount: refund.amount,
            reason: refund.reason,
            refund_date: refund.refund_date,
            is_fraudulent: false,
        };
        refunds.push(record.clone());

        if let Some(from) = cancel_order_from {
            self.orders.set_status_if(refund.order_id, from, OrderStatus::Cancelled).await;
        }

        Ok(Some(record))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<RefundRecord>, RepositoryError> {
        let refunds = self.refunds.read().await;
        Ok(refunds.iter().filter(|refund| refund.user_id == user_id).cloned().collect())
    }
}
