use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use redress_core::domain::order::Order;
use redress_core::errors::ActionError;

use redress_db::repositories::{OrderRepository, RepositoryError};

use crate::handlers::{ActionHandler, ActionParams, PARAM_ORDER_ID};

/// Read-only status report for a single order.
pub struct StatusHandler {
    orders: Arc<dyn OrderRepository>,
}

impl StatusHandler {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// The read is idempotent, so one retry on a transient store failure is
    /// safe.
    async fn read_with_retry(
        &self,
        params: &ActionParams,
    ) -> Result<Option<Order>, RepositoryError> {
        let order_id = match params.order_id {
            Some(order_id) => order_id,
            None => return Ok(None),
        };
        match self.orders.find_by_id(order_id).await {
            Ok(order) => Ok(order),
            Err(error) => {
                warn!(%error, order_id = order_id.0, "status read failed; retrying once");
                self.orders.find_by_id(order_id).await
            }
        }
    }
}

#[async_trait::async_trait]
impl ActionHandler for StatusHandler {
    fn name(&self) -> &'static str {
        "get_order_status"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PARAM_ORDER_ID]
    }

    async fn execute(&self, params: &ActionParams) -> Result<Value, ActionError> {
        params.order_id_required()?;

        let order = self
            .read_with_retry(params)
            .await
            .map_err(|error| ActionError::Transient(error.to_string()))?
            .filter(|order| order.user_id == params.user_id)
            .ok_or_else(|| {
                ActionError::NotFound("I couldn't find that order on your account.".to_string())
            })?;

        Ok(json!({
            "order_id": order.id.0,
            "status": order.status.as_str(),
            "user_id": order.user_id.0,
            "product_id": order.product_id,
            "product_name": order.product_name,
            "amount": order.amount.to_string(),
            "order_date": order.order_date.to_rfc3339(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use redress_core::domain::order::{Order, OrderId, OrderStatus};
    use redress_core::domain::user::UserId;
    use redress_core::errors::ActionError;

    use redress_db::repositories::{
        InMemoryOrderRepository, NewOrder, OrderRepository, RepositoryError,
    };

    use crate::handlers::{ActionHandler, ActionParams};

    use super::StatusHandler;

    /// Fails the first `fail_first` reads, then delegates to the in-memory
    /// repository.
    struct FlakyOrders {
        inner: InMemoryOrderRepository,
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl OrderRepository for FlakyOrders {
        async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(RepositoryError::Decode("injected failure".to_string()));
            }
            self.inner.find_by_id(id).await
        }

        async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
            self.inner.list_for_user(user_id).await
        }

        async fn search_for_user(
            &self,
            user_id: UserId,
            terms: &[String],
            status: Option<OrderStatus>,
        ) -> Result<Vec<Order>, RepositoryError> {
            self.inner.search_for_user(user_id, terms, status).await
        }

        async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
            self.inner.insert(order).await
        }

        async fn transition_status(
            &self,
            id: OrderId,
            expected: OrderStatus,
            next: OrderStatus,
        ) -> Result<bool, RepositoryError> {
            self.inner.transition_status(id, expected, next).await
        }

        async fn create_replacement(
            &self,
            original: OrderId,
            now: DateTime<Utc>,
        ) -> Result<Option<Order>, RepositoryError> {
            self.inner.create_replacement(original, now).await
        }

        async fn count_recent_shipped(
            &self,
            user_id: UserId,
            since: DateTime<Utc>,
            exclude: OrderId,
        ) -> Result<u32, RepositoryError> {
            self.inner.count_recent_shipped(user_id, since, exclude).await
        }
    }

    async fn seeded(fail_first: u32) -> (Arc<FlakyOrders>, OrderId) {
        let inner = InMemoryOrderRepository::new();
        let order = inner
            .insert(NewOrder {
                user_id: UserId(1),
                product_id: 2,
                product_name: Some("Ceramic Mug Set".to_string()),
                amount: rust_decimal::Decimal::new(3400, 2),
                status: OrderStatus::Shipped,
                order_date: Utc::now(),
                shipping_address: None,
                replacement_of: None,
            })
            .await
            .expect("insert");
        (Arc::new(FlakyOrders { inner, calls: AtomicU32::new(0), fail_first }), order.id)
    }

    fn params(order_id: OrderId) -> ActionParams {
        let mut params = ActionParams::new(UserId(1));
        params.order_id = Some(order_id);
        params
    }

    #[tokio::test]
    async fn reports_full_order_detail() {
        let (orders, order_id) = seeded(0).await;
        let handler = StatusHandler::new(orders);

        let payload = handler.execute(&params(order_id)).await.expect("status");
        assert_eq!(payload["status"], "shipped");
        assert_eq!(payload["product_name"], "Ceramic Mug Set");
        assert_eq!(payload["amount"], "34.00");
    }

    #[tokio::test]
    async fn retries_the_read_once_on_transient_failure() {
        let (orders, order_id) = seeded(1).await;
        let handler = StatusHandler::new(orders.clone());

        let payload = handler.execute(&params(order_id)).await.expect("status after retry");
        assert_eq!(payload["order_id"], order_id.0);
        assert_eq!(orders.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn two_failures_surface_as_transient() {
        let (orders, order_id) = seeded(2).await;
        let handler = StatusHandler::new(orders);

        let error = handler.execute(&params(order_id)).await.expect_err("still failing");
        assert!(matches!(error, ActionError::Transient(_)));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (orders, _) = seeded(0).await;
        let handler = StatusHandler::new(orders);
        let error = handler.execute(&params(OrderId(40404))).await.expect_err("missing");
        assert!(matches!(error, ActionError::NotFound(_)));
    }
}
