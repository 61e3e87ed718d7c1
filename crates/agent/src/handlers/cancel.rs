use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use redress_core::domain::order::OrderStatus;
use redress_core::errors::ActionError;

use redress_db::repositories::OrderRepository;

use crate::handlers::{ActionHandler, ActionParams, PARAM_ORDER_ID};

pub struct CancelHandler {
    orders: Arc<dyn OrderRepository>,
}

impl CancelHandler {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }
}

#[async_trait::async_trait]
impl ActionHandler for CancelHandler {
    fn name(&self) -> &'static str {
        "cancel_order"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PARAM_ORDER_ID]
    }

    async fn execute(&self, params: &ActionParams) -> Result<Value, ActionError> {
        let order_id = params.order_id_required()?;

        let order = self
            .orders
            .find_by_id(order_id)
            .await
            .map_err(|error| ActionError::Transient(error.to_string()))?
            .filter(|order| order.user_id == params.user_id)
            .ok_or_else(|| {
                ActionError::NotFound("I couldn't find that order on your account.".to_string())
            })?;

        match order.status {
            OrderStatus::Cancelled => {
                return Err(ActionError::Ineligible(format!(
                    "Order #{} is already cancelled.",
                    order.id
                )));
            }
            OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Returned => {
                return Err(ActionError::Ineligible(format!(
                    "Order #{} has already shipped and can no longer be cancelled.",
                    order.id
                )));
            }
            OrderStatus::Pending => {}
        }

        // Guarded compare-and-set; a false return means the row moved under
        // us between the read and the update.
        let cancelled = self
            .orders
            .transition_status(order_id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .map_err(|error| ActionError::Transient(error.to_string()))?;
        if !cancelled {
            return Err(ActionError::Transient(format!(
                "order {order_id} changed status during cancellation"
            )));
        }

        info!(order_id = order.id.0, "order cancelled");
        Ok(json!({
            "order_id": order.id.0,
            "status": OrderStatus::Cancelled.as_str(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use redress_core::domain::order::{OrderId, OrderStatus};
    use redress_core::domain::user::UserId;
    use redress_core::errors::ActionError;

    use redress_db::repositories::{InMemoryOrderRepository, NewOrder, OrderRepository};

    use crate::handlers::{ActionHandler, ActionParams};

    use super::CancelHandler;

    async fn seeded(status: OrderStatus) -> (Arc<InMemoryOrderRepository>, OrderId) {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let order = orders
            .insert(NewOrder {
                user_id: UserId(1),
                product_id: 5,
                product_name: Some("Mechanical Keyboard".to_string()),
                amount: Decimal::new(12900, 2),
                status,
                order_date: Utc::now(),
                shipping_address: None,
                replacement_of: None,
            })
            .await
            .expect("insert");
        (orders, order.id)
    }

    fn params(order_id: OrderId) -> ActionParams {
        let mut params = ActionParams::new(UserId(1));
        params.order_id = Some(order_id);
        params
    }

    #[tokio::test]
    async fn cancels_a_pending_order() {
        let (orders, order_id) = seeded(OrderStatus::Pending).await;
        let handler = CancelHandler::new(orders.clone());

        let payload = handler.execute(&params(order_id)).await.expect("cancel");
        assert_eq!(payload["status"], "cancelled");
        let order = orders.find_by_id(order_id).await.expect("find").expect("present");
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_errors_without_mutation() {
        let (orders, order_id) = seeded(OrderStatus::Cancelled).await;
        let handler = CancelHandler::new(orders.clone());

        let error = handler.execute(&params(order_id)).await.expect_err("already cancelled");
        assert!(matches!(error, ActionError::Ineligible(_)));
        assert!(error.user_message().contains("already cancelled"));
        let order = orders.find_by_id(order_id).await.expect("find").expect("present");
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn shipped_and_later_statuses_are_too_late() {
        for status in [OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Returned] {
            let (orders, order_id) = seeded(status).await;
            let handler = CancelHandler::new(orders.clone());

            let error = handler.execute(&params(order_id)).await.expect_err("too late");
            assert!(error.user_message().contains("no longer be cancelled"));
            let order = orders.find_by_id(order_id).await.expect("find").expect("present");
            assert_eq!(order.status, status);
        }
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let handler = CancelHandler::new(orders);
        let error = handler.execute(&params(OrderId(9999))).await.expect_err("missing");
        assert!(matches!(error, ActionError::NotFound(_)));
    }
}
