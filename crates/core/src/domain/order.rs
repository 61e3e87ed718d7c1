use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Shipped,
    Cancelled,
    Returned,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "shipped" => Some(Self::Shipped),
            "cancelled" => Some(Self::Cancelled),
            "returned" => Some(Self::Returned),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }

    /// Cancelled and Delivered accept no further refund/replacement-relevant
    /// transitions.
    pub fn is_absorbing(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Delivered)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub shipping_address: Option<String>,
    /// Set when this row is a replacement created for another order.
    pub replacement_of: Option<OrderId>,
}

impl Order {
    /// Lifecycle is monotone: Pending -> Shipped -> {Delivered, Returned,
    /// Cancelled}, plus Pending -> Cancelled directly.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Pending, OrderStatus::Shipped)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
                | (OrderStatus::Shipped, OrderStatus::Returned)
                | (OrderStatus::Shipped, OrderStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    use super::{Order, OrderId, OrderStatus};

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId(1001),
            user_id: UserId(1),
            product_id: 7,
            product_name: Some("Blue Widget".to_string()),
            amount: Decimal::new(4999, 2),
            status,
            order_date: Utc::now(),
            shipping_address: Some("12 Main St".to_string()),
            replacement_of: None,
        }
    }

    #[test]
    fn allows_monotone_transitions() {
        let mut order = order(OrderStatus::Pending);
        order.transition_to(OrderStatus::Shipped).expect("pending -> shipped");
        order.transition_to(OrderStatus::Delivered).expect("shipped -> delivered");
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn blocks_regressing_transitions() {
        let mut order = order(OrderStatus::Delivered);
        let error = order
            .transition_to(OrderStatus::Pending)
            .expect_err("delivered -> pending should fail");
        assert!(matches!(error, DomainError::InvalidOrderTransition { .. }));
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn cancelled_is_absorbing() {
        let mut order = order(OrderStatus::Cancelled);
        assert!(order.status.is_absorbing());
        assert!(order.transition_to(OrderStatus::Shipped).is_err());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Shipped,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
            OrderStatus::Delivered,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
    }
}
