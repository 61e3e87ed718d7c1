use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, warn};

use redress_core::action::ActionResult;
use redress_core::audit::{AuditError, AuditRecord, AuditSink};
use redress_core::errors::ActionError;
use redress_core::intent::Intent;

use redress_db::repositories::{OrderRepository, RefundRepository};

use crate::handlers::{
    ActionHandler, CancelHandler, EscalateHandler, RefundHandler, ReplacementHandler,
    StatusHandler,
};
use crate::lookup::ExternalLookup;

pub use crate::handlers::ActionParams;

/// Maps intents to handlers and funnels every outcome through the audit
/// sink. Exactly one audit record is appended per dispatch, success or not,
/// before the result is handed back.
pub struct ActionRegistry {
    handlers: HashMap<Intent, Arc<dyn ActionHandler>>,
    audit: Arc<dyn AuditSink>,
}

impl ActionRegistry {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { handlers: HashMap::new(), audit }
    }

    /// The full production handler set.
    pub fn with_default_handlers(
        orders: Arc<dyn OrderRepository>,
        refunds: Arc<dyn RefundRepository>,
        lookup: Arc<dyn ExternalLookup>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let mut registry = Self::new(audit);
        registry.register(
            Intent::Refund,
            Arc::new(RefundHandler::new(orders.clone(), refunds, lookup)),
        );
        registry.register(Intent::Cancel, Arc::new(CancelHandler::new(orders.clone())));
        registry.register(Intent::Replacement, Arc::new(ReplacementHandler::new(orders.clone())));
        registry.register(Intent::Escalate, Arc::new(EscalateHandler));
        registry.register(Intent::Status, Arc::new(StatusHandler::new(orders)));
        registry
    }

    pub fn register(&mut self, intent: Intent, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(intent, handler);
    }

    /// Required parameters the given intent still lacks. Unregistered intents
    /// require nothing; they fail as unsupported instead.
    pub fn missing_params(&self, intent: Intent, params: &ActionParams) -> Vec<String> {
        self.handlers.get(&intent).map_or_else(Vec::new, |handler| {
            handler
                .required_params()
                .iter()
                .filter(|name| !params.has(name))
                .map(|name| name.to_string())
                .collect()
        })
    }

    pub async fn dispatch(&self, intent: Intent, params: &ActionParams) -> ActionResult {
        let (action, result) = match self.handlers.get(&intent) {
            None => {
                let error = ActionError::UnsupportedIntent(intent.as_str().to_string());
                ("unsupported_intent", ActionResult::failed("unsupported_intent", &error))
            }
            Some(handler) => {
                let missing = self.missing_params(intent, params);
                let result = if missing.is_empty() {
                    match handler.execute(params).await {
                        Ok(payload) => ActionResult::ok(handler.name(), payload),
                        Err(error) => ActionResult::failed(handler.name(), &error),
                    }
                } else {
                    ActionResult::failed(handler.name(), &ActionError::Validation { missing })
                };
                (handler.name(), result)
            }
        };

        let result_json = serde_json::to_value(&result)
            .unwrap_or_else(|_| json!({ "success": result.success }));
        let record = AuditRecord::new(action, params.audit_json(), result_json);
        if let Err(append_error) = self.append_durably(record) {
            error!(%append_error, action, "audit append failed; reporting dispatch as failed");
            return ActionResult::failed(
                action,
                &ActionError::Transient(format!("audit append failed: {append_error}")),
            );
        }

        debug!(action, success = result.success, "action dispatched");
        result
    }

    /// The audit trail is the system of record for action attempts; an
    /// outcome that cannot be recorded must not be reported as done. One
    /// retry covers a transient sink hiccup, then the dispatch fails.
    fn append_durably(&self, record: AuditRecord) -> Result<(), AuditError> {
        match self.audit.append(record.clone()) {
            Ok(()) => Ok(()),
            Err(first_error) => {
                warn!(%first_error, "audit append failed; retrying once");
                self.audit.append(record)
            }
        }
    }
}
