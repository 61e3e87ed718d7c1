use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use redress_core::domain::order::{Order, OrderStatus};
use redress_core::errors::ActionError;

use redress_db::repositories::{NewRefund, OrderRepository, RefundRepository};

use crate::handlers::{ActionHandler, ActionParams, PARAM_AMOUNT, PARAM_ORDER_ID, PARAM_REASON};
use crate::lookup::ExternalLookup;

/// Rolling refund cap: strictly fewer than this many refunds per user in the
/// trailing window.
pub const MAX_REFUNDS_PER_WINDOW: u32 = 2;
pub const REFUND_WINDOW_DAYS: i64 = 30;

pub struct RefundHandler {
    orders: Arc<dyn OrderRepository>,
    refunds: Arc<dyn RefundRepository>,
    lookup: Arc<dyn ExternalLookup>,
}

impl RefundHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        refunds: Arc<dyn RefundRepository>,
        lookup: Arc<dyn ExternalLookup>,
    ) -> Self {
        Self { orders, refunds, lookup }
    }

    /// Non-cancelled orders qualify only when the product is perishable.
    /// Lookup failures count as "no evidence"; the customer is never blocked
    /// on a flaky collaborator, only denied the perishability path.
    async fn is_perishable(&self, order: &Order) -> bool {
        let product = order.product_name.as_deref().unwrap_or("this product");
        let query = format!("Is {product} perishable?");
        match self.lookup.search(&query).await {
            Ok(response) => response.indicates_perishable(),
            Err(error) => {
                warn!(%error, order_id = order.id.0, "perishability lookup failed");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl ActionHandler for RefundHandler {
    fn name(&self) -> &'static str {
        "issue_refund"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PARAM_ORDER_ID, PARAM_AMOUNT, PARAM_REASON]
    }

    async fn execute(&self, params: &ActionParams) -> Result<Value, ActionError> {
        let order_id = params.order_id_required()?;
        let amount = params
            .amount
            .ok_or_else(|| ActionError::Validation { missing: vec![PARAM_AMOUNT.to_string()] })?;
        let reason = params
            .reason
            .clone()
            .ok_or_else(|| ActionError::Validation { missing: vec![PARAM_REASON.to_string()] })?;

        let order = self
            .orders
            .find_by_id(order_id)
            .await
            .map_err(|error| ActionError::Transient(error.to_string()))?
            .filter(|order| order.user_id == params.user_id)
            .ok_or_else(|| {
                ActionError::NotFound("I couldn't find that order on your account.".to_string())
            })?;

        if amount <= rust_decimal::Decimal::ZERO || amount > order.amount {
            return Err(ActionError::InvalidAmount(format!(
                "The refund amount must be above zero and at most the order total of ${}.",
                order.amount
            )));
        }

        if order.status != OrderStatus::Cancelled && !self.is_perishable(&order).await {
            return Err(ActionError::Ineligible(format!(
                "Order #{} is not eligible for a refund in its current status ({}).",
                order.id, order.status.as_str()
            )));
        }

        let now = Utc::now();
        let window_start = now - Duration::days(REFUND_WINDOW_DAYS);
        // A full refund also cancels the order when its lifecycle still
        // permits that; Delivered stays Delivered.
        let cancel_order_from = (amount == order.amount
            && order.can_transition_to(OrderStatus::Cancelled))
        .then_some(order.status);

        let appended = self
            .refunds
            .append_within_limit(
                NewRefund {
                    user_id: params.user_id,
                    order_id,
                    amount,
                    reason: reason.clone(),
                    refund_date: now,
                },
                window_start,
                MAX_REFUNDS_PER_WINDOW,
                cancel_order_from,
            )
            .await
            .map_err(|error| ActionError::Transient(error.to_string()))?;

        let Some(refund) = appended else {
            return Err(ActionError::LimitExceeded(format!(
                "Refund limit reached: at most {MAX_REFUNDS_PER_WINDOW} refunds per \
                 {REFUND_WINDOW_DAYS} days."
            )));
        };

        info!(refund_id = refund.id.0, order_id = order.id.0, "refund issued");
        Ok(json!({
            "refund_id": refund.id.0,
            "order_id": order.id.0,
            "amount": amount.to_string(),
            "reason": reason,
            "order_cancelled": cancel_order_from.is_some(),
        }))
    }
}
