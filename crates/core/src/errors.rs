use thiserror::Error;

use crate::domain::order::OrderStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Every failure a handler or the dispatcher can surface. Converted into an
/// `ActionResult` before crossing the dispatcher boundary; no variant is ever
/// allowed to propagate to the caller as a raw fault.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("missing required parameters: {}", missing.join(", "))]
    Validation { missing: Vec<String> },
    #[error("{0}")]
    InvalidAmount(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Ineligible(String),
    #[error("{0}")]
    LimitExceeded(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("unsupported intent: {0}")]
    UnsupportedIntent(String),
}

impl ActionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::NotFound(_) => "not_found",
            Self::Ineligible(_) => "ineligible",
            Self::LimitExceeded(_) => "limit_exceeded",
            Self::Transient(_) => "transient",
            Self::UnsupportedIntent(_) => "unsupported_intent",
        }
    }

    /// The message shown to the customer. Business-rule rejections name the
    /// specific rule; transient failures degrade to a generic apology.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { missing } => format!(
                "I need a bit more information before I can do that: {}.",
                missing.join(", ")
            ),
            Self::InvalidAmount(message)
            | Self::NotFound(message)
            | Self::Ineligible(message)
            | Self::LimitExceeded(message) => message.clone(),
            Self::Transient(_) => {
                "I'm sorry, something went wrong. Please try your request again.".to_string()
            }
            Self::UnsupportedIntent(_) => {
                "I'm sorry, I can't help with that request. I can check order status, \
                 issue refunds, cancel orders, arrange replacements, or escalate to a human agent."
                    .to_string()
            }
        }
    }
}
