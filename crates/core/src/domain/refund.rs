use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefundId(pub i64);

/// One row of the append-only refund ledger. Created only by the refund
/// handler and never mutated afterwards; the rolling 30-day refund cap is
/// computed over this ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub id: RefundId,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub reason: String,
    pub refund_date: DateTime<Utc>,
    pub is_fraudulent: bool,
}
