pub mod action;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intent;
pub mod redact;

pub use action::{ActionResult, ConversationContext, PendingStep, SupportRequest, SupportResponse};
pub use audit::{AuditError, AuditRecord, AuditSink, InMemoryAuditSink, JsonlAuditSink};
pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::refund::{RefundId, RefundRecord};
pub use domain::user::UserId;
pub use errors::{ActionError, DomainError};
pub use intent::Intent;
pub use redact::redact_pii;
