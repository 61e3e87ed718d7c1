use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use redress_core::domain::order::OrderId;
use redress_core::domain::user::UserId;
use redress_core::errors::ActionError;
use redress_core::redact::redact_pii;

pub mod cancel;
pub mod escalate;
pub mod refund;
pub mod replacement;
pub mod status;

pub use cancel::CancelHandler;
pub use escalate::EscalateHandler;
pub use refund::RefundHandler;
pub use replacement::ReplacementHandler;
pub use status::StatusHandler;

pub const PARAM_ORDER_ID: &str = "order_id";
pub const PARAM_AMOUNT: &str = "amount";
pub const PARAM_REASON: &str = "reason";

/// Parameters assembled by the runtime for one dispatch. `user_id` is always
/// present; the rest is filled from resolution and message parsing.
#[derive(Clone, Debug)]
pub struct ActionParams {
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

impl ActionParams {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, order_id: None, amount: None, reason: None }
    }

    pub fn has(&self, name: &str) -> bool {
        match name {
            PARAM_ORDER_ID => self.order_id.is_some(),
            PARAM_AMOUNT => self.amount.is_some(),
            PARAM_REASON => self.reason.is_some(),
            _ => false,
        }
    }

    /// The order id, which dispatch validation has already checked for.
    pub(crate) fn order_id_required(&self) -> Result<OrderId, ActionError> {
        self.order_id
            .ok_or_else(|| ActionError::Validation { missing: vec![PARAM_ORDER_ID.to_string()] })
    }

    /// Audit-safe rendering: free text is redacted before it is persisted.
    pub fn audit_json(&self) -> Value {
        json!({
            "user_id": self.user_id.0,
            "order_id": self.order_id.map(|id| id.0),
            "amount": self.amount.map(|amount| amount.to_string()),
            "reason": self.reason.as_deref().map(redact_pii),
        })
    }
}

/// One backend action. Handlers read state, evaluate eligibility, and mutate
/// through a single guarded repository operation; every failure is a typed
/// `ActionError`, never a panic or raw propagation.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parameters the dispatcher must see before `execute` is invoked.
    fn required_params(&self) -> &'static [&'static str];

    async fn execute(&self, params: &ActionParams) -> Result<Value, ActionError>;
}
