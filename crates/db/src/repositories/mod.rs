use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use redress_core::domain::order::{Order, OrderId, OrderStatus};
use redress_core::domain::refund::RefundRecord;
use redress_core::domain::user::UserId;

pub mod memory;
pub mod order;
pub mod refund;

pub use memory::{InMemoryOrderRepository, InMemoryRefundRepository};
pub use order::SqlOrderRepository;
pub use refund::SqlRefundRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Insert payload for a new order row.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: UserId,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub shipping_address: Option<String>,
    pub replacement_of: Option<OrderId>,
}

#[derive(Clone, Debug)]
pub struct NewRefund {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub reason: String,
    pub refund_date: DateTime<Utc>,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// All orders for a user, most recent first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Orders whose product name contains any of `terms` (case-insensitive),
    /// optionally filtered by status, most recent first.
    async fn search_for_user(
        &self,
        user_id: UserId,
        terms: &[String],
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError>;

    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Compare-and-set status transition. Returns false when the row was not
    /// in `expected` anymore; the caller re-reads and reports accordingly.
    async fn transition_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool, RepositoryError>;

    /// Within one transaction: re-check that `original` is still Shipped and
    /// insert the replacement row (same product, amount 0, status Pending).
    /// Returns None when the status guard fails.
    async fn create_replacement(
        &self,
        original: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Number of the user's Shipped orders dated on/after `since`, excluding
    /// the given order. Feeds the one-replacement-per-window rule.
    async fn count_recent_shipped(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        exclude: OrderId,
    ) -> Result<u32, RepositoryError>;
}

#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn count_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    /// Atomic cap-check-then-append: within one write transaction, count the
    /// user's refunds dated on/after `window_start`; if the count is below
    /// `max_in_window`, append the record and, when `cancel_order_from` is
    /// set, transition the refunded order from that status to Cancelled.
    /// Returns None when the cap blocks the append (ledger unchanged).
    async fn append_within_limit(
        &self,
        refund: NewRefund,
        window_start: DateTime<Utc>,
        max_in_window: u32,
        cancel_order_from: Option<OrderStatus>,
    ) -> Result<Option<RefundRecord>, RepositoryError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<RefundRecord>, RepositoryError>;
}

/// Case-insensitive any-term substring match shared by both repository
/// implementations.
pub(crate) fn product_matches(product_name: &str, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let product_lower = product_name.to_lowercase();
    terms.iter().any(|term| !term.is_empty() && product_lower.contains(&term.to_lowercase()))
}
