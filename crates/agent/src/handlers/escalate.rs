use serde_json::{json, Value};
use tracing::info;

use redress_core::errors::ActionError;

use crate::handlers::{ActionHandler, ActionParams, PARAM_ORDER_ID};

/// Hands the case to a human queue. Succeeds whenever the identifiers are
/// present; the escalation itself is recorded through the dispatch audit
/// trail.
pub struct EscalateHandler;

#[async_trait::async_trait]
impl ActionHandler for EscalateHandler {
    fn name(&self) -> &'static str {
        "escalate_case"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PARAM_ORDER_ID]
    }

    async fn execute(&self, params: &ActionParams) -> Result<Value, ActionError> {
        let order_id = params.order_id_required()?;
        info!(order_id = order_id.0, user_id = params.user_id.0, "case escalated");
        Ok(json!({
            "order_id": order_id.0,
            "user_id": params.user_id.0,
            "escalated": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use redress_core::domain::order::OrderId;
    use redress_core::domain::user::UserId;
    use redress_core::errors::ActionError;

    use crate::handlers::{ActionHandler, ActionParams};

    use super::EscalateHandler;

    #[tokio::test]
    async fn escalation_always_succeeds_with_identifiers() {
        let mut params = ActionParams::new(UserId(7));
        params.order_id = Some(OrderId(1234));
        let payload = EscalateHandler.execute(&params).await.expect("escalate");
        assert_eq!(payload["escalated"], true);
        assert_eq!(payload["user_id"], 7);
    }

    #[tokio::test]
    async fn missing_order_id_is_a_validation_error() {
        let params = ActionParams::new(UserId(7));
        let error = EscalateHandler.execute(&params).await.expect_err("missing id");
        assert!(matches!(error, ActionError::Validation { .. }));
    }
}
