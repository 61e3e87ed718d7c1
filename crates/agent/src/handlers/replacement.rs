use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::info;

use redress_core::domain::order::OrderStatus;
use redress_core::errors::ActionError;

use redress_db::repositories::OrderRepository;

use crate::handlers::{ActionHandler, ActionParams, PARAM_ORDER_ID};

/// Days after the order date during which a replacement may be requested,
/// and the trailing window in which only one replacement-eligible shipment
/// per user is allowed.
pub const REPLACEMENT_WINDOW_DAYS: i64 = 15;

pub struct ReplacementHandler {
    orders: Arc<dyn OrderRepository>,
}

impl ReplacementHandler {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }
}

#[async_trait::async_trait]
impl ActionHandler for ReplacementHandler {
    fn name(&self) -> &'static str {
        "trigger_replacement"
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

        if order.status != OrderStatus::Shipped {
            return Err(ActionError::Ineligible(format!(
                "Order #{} is not eligible for replacement in its current status ({}).",
                order.id, order.status.as_str()
            )));
        }

        let now = Utc::now();
        if now > order.order_date + Duration::days(REPLACEMENT_WINDOW_DAYS) {
            return Err(ActionError::Ineligible(format!(
                "The replacement window has expired ({REPLACEMENT_WINDOW_DAYS} days from the \
                 order date)."
            )));
        }

        // The order being replaced does not count against its own window.
        let window_start = now - Duration::days(REPLACEMENT_WINDOW_DAYS);
        let recent = self
            .orders
            .count_recent_shipped(params.user_id, window_start, order.id)
            .await
            .map_err(|error| ActionError::Transient(error.to_string()))?;
        if recent > 0 {
            return Err(ActionError::LimitExceeded(format!(
                "You cannot request another replacement within {REPLACEMENT_WINDOW_DAYS} days \
                 of a previous one."
            )));
        }

        let replacement = self
            .orders
            .create_replacement(order.id, now)
            .await
            .map_err(|error| ActionError::Transient(error.to_string()))?
            .ok_or_else(|| {
                ActionError::Transient(format!(
                    "order {} changed status during replacement creation",
                    order.id
                ))
            })?;

        info!(
            order_id = order.id.0,
            replacement_id = replacement.id.0,
            "replacement order created"
        );
        Ok(json!({
            "original_order_id": order.id.0,
            "replacement_order_id": replacement.id.0,
            "product_name": replacement.product_name,
            "replacement_status": replacement.status.as_str(),
        }))
    }
}
