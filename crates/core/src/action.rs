use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::order::OrderId;
use crate::errors::ActionError;
use crate::intent::Intent;

/// Tagged outcome of a dispatched action. Always produced as a value; no
/// handler failure crosses the dispatcher boundary as a raw fault.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionFailure>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl ActionResult {
    pub fn ok(action: impl Into<String>, payload: Value) -> Self {
        Self { success: true, action: action.into(), payload: Some(payload), error: None }
    }

    pub fn failed(action: impl Into<String>, error: &ActionError) -> Self {
        let missing = match error {
            ActionError::Validation { missing } => missing.clone(),
            _ => Vec::new(),
        };
        Self {
            success: false,
            action: action.into(),
            payload: None,
            error: Some(ActionFailure {
                kind: error.kind().to_string(),
                message: error.user_message(),
                missing,
            }),
        }
    }

    pub fn needs_input(&self) -> bool {
        self.error.as_ref().is_some_and(|failure| failure.kind == "validation")
    }
}

/// One entry of the caller-supplied conversation transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// An order candidate offered to the user during clarification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderCandidate {
    pub order_id: OrderId,
    pub product_name: String,
    pub status: String,
    pub order_date: String,
    pub amount: String,
}

/// What the conversation is waiting on. Serialized into the response metadata
/// and round-tripped by the caller; the runtime itself holds no session
/// state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PendingStep {
    /// The resolver offered candidates; the next turn selects one.
    SelectOrder { intent: Intent, candidates: Vec<OrderCandidate> },
    /// The dispatcher reported missing parameters; the next turn supplies
    /// them.
    ProvideParams { intent: Intent, order_id: Option<OrderId>, missing: Vec<String> },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingStep>,
}

impl ConversationContext {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Inbound request at the service boundary.
#[derive(Clone, Debug, Deserialize)]
pub struct SupportRequest {
    pub user_input: String,
    pub user_id: i64,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
    /// Opaque round-trip of the previous response's `metadata.context`.
    #[serde(default)]
    pub context: Option<ConversationContext>,
}

/// Outbound response at the service boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupportResponse {
    pub response: String,
    pub conversation_id: String,
    pub needs_clarification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_prompt: Option<String>,
    pub metadata: ResponseMetadata,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_result: Option<ActionResult>,
    /// To be echoed back as the next request's `context`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ConversationContext>,
}
