use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use redress_core::action::{
    ActionResult, ConversationContext, OrderCandidate, PendingStep, ResponseMetadata,
    SupportRequest, SupportResponse,
};
use redress_core::domain::order::{OrderId, OrderStatus};
use redress_core::domain::user::UserId;
use redress_core::intent::Intent;
use redress_core::redact::redact_pii;

use crate::classifier::IntentClassifier;
use crate::dispatch::{ActionParams, ActionRegistry};
use crate::handlers::PARAM_AMOUNT;
use crate::resolver::{resolve_selection, OrderResolver, Resolution};
use crate::retriever::PolicyIndex;

const APOLOGY: &str = "I'm sorry, something went wrong. Please try your request again.";

/// Ties the pipeline together for one request: redact, retrieve, classify,
/// resolve, dispatch, respond. Stateless per request; anything the next turn
/// needs rides in the returned `ConversationContext`.
pub struct AgentRuntime {
    classifier: IntentClassifier,
    index: Arc<PolicyIndex>,
    resolver: OrderResolver,
    registry: ActionRegistry,
}

impl AgentRuntime {
    pub fn new(
        classifier: IntentClassifier,
        index: Arc<PolicyIndex>,
        resolver: OrderResolver,
        registry: ActionRegistry,
    ) -> Self {
        Self { classifier, index, resolver, registry }
    }

    /// Every path terminates in a response; total internal failure degrades
    /// to the generic apology flagged unsuccessful.
    pub async fn handle(&self, request: SupportRequest) -> SupportResponse {
        let conversation_id =
            request.conversation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(pending) = request.context.as_ref().and_then(|context| context.pending.clone())
        {
            return self.resume(pending, &request, conversation_id).await;
        }

        let redacted = redact_pii(&request.user_input);
        let policy_context = self.index.context_for(&redacted);

        let intent = match self.classifier.classify(&redacted, &policy_context).await {
            Ok(intent) => intent,
            Err(error) => {
                warn!(%error, "classification failed; degrading to apology");
                return degraded(conversation_id);
            }
        };
        info!(intent = %intent, "intent classified");

        let user_id = UserId(request.user_id);
        if intent == Intent::Other {
            let result = self.registry.dispatch(intent, &ActionParams::new(user_id)).await;
            let message = result
                .error
                .as_ref()
                .map(|failure| failure.message.clone())
                .unwrap_or_else(|| APOLOGY.to_string());
            return respond(conversation_id, message, false, None, metadata(intent, result, None));
        }

        let status_filter =
            (intent == Intent::Replacement).then_some(OrderStatus::Shipped);
        let resolution = match self.resolver.resolve(user_id, &redacted, status_filter).await {
            Ok(resolution) => resolution,
            Err(error) => {
                warn!(%error, "order resolution failed; degrading to apology");
                return degraded(conversation_id);
            }
        };

        match resolution {
            Resolution::Resolved(order_id) => {
                self.execute(intent, Some(order_id), &request, conversation_id).await
            }
            Resolution::Clarification { prompt, candidates } => {
                let context = ConversationContext {
                    pending: Some(PendingStep::SelectOrder { intent, candidates }),
                };
                clarify(conversation_id, prompt, intent, context)
            }
            Resolution::NotFound(message) => {
                respond(
                    conversation_id,
                    message.clone(),
                    true,
                    Some(message),
                    ResponseMetadata { success: true, intent: Some(intent), ..Default::default() },
                )
            }
        }
    }

    async fn resume(
        &self,
        pending: PendingStep,
        request: &SupportRequest,
        conversation_id: String,
    ) -> SupportResponse {
        match pending {
            PendingStep::SelectOrder { intent, candidates } => {
                match resolve_selection(&request.user_input, &candidates) {
                    Some(order_id) => {
                        self.execute(intent, Some(order_id), request, conversation_id).await
                    }
                    None => reask_selection(conversation_id, intent, candidates),
                }
            }
            PendingStep::ProvideParams { intent, order_id, missing } => {
                let mut params = ActionParams::new(UserId(request.user_id));
                params.order_id = order_id;
                self.fill_params(&mut params, intent, &request.user_input);

                // The amount must parse as a money token; free text alone
                // cannot stand in for it.
                if missing.iter().any(|name| name == PARAM_AMOUNT) && params.amount.is_none() {
                    let prompt =
                        "Please tell me the refund amount, for example 12.50.".to_string();
                    let context = ConversationContext {
                        pending: Some(PendingStep::ProvideParams { intent, order_id, missing }),
                    };
                    return clarify(conversation_id, prompt, intent, context);
                }

                self.dispatch_and_respond(intent, params, conversation_id).await
            }
        }
    }

    async fn execute(
        &self,
        intent: Intent,
        order_id: Option<OrderId>,
        request: &SupportRequest,
        conversation_id: String,
    ) -> SupportResponse {
        let mut params = ActionParams::new(UserId(request.user_id));
        params.order_id = order_id;
        self.fill_params(&mut params, intent, &request.user_input);
        self.dispatch_and_respond(intent, params, conversation_id).await
    }

    /// Fill optional parameters from the message text. Nothing is guessed:
    /// an amount is taken only from an explicit money token, and the reason
    /// is the customer's own (redacted) words.
    fn fill_params(&self, params: &mut ActionParams, intent: Intent, user_input: &str) {
        if intent != Intent::Refund {
            return;
        }
        params.amount = extract_amount(user_input);
        let reason = redact_pii(user_input);
        if !reason.trim().is_empty() {
            params.reason = Some(reason.trim().to_string());
        }
    }

    async fn dispatch_and_respond(
        &self,
        intent: Intent,
        params: ActionParams,
        conversation_id: String,
    ) -> SupportResponse {
        let result = self.registry.dispatch(intent, &params).await;

        if result.needs_input() {
            let failure = result.error.clone();
            let (message, missing) = failure
                .map(|failure| (failure.message, failure.missing))
                .unwrap_or_else(|| (APOLOGY.to_string(), Vec::new()));
            let context = ConversationContext {
                pending: Some(PendingStep::ProvideParams {
                    intent,
                    order_id: params.order_id,
                    missing,
                }),
            };
            return respond(
                conversation_id,
                message.clone(),
                true,
                Some(message),
                metadata(intent, result, Some(context)),
            );
        }

        let message = if result.success {
            render_success(intent, &result)
        } else {
            result
                .error
                .as_ref()
                .map(|failure| failure.message.clone())
                .unwrap_or_else(|| APOLOGY.to_string())
        };
        respond(conversation_id, message, false, None, metadata(intent, result, None))
    }
}

fn metadata(
    intent: Intent,
    result: ActionResult,
    context: Option<ConversationContext>,
) -> ResponseMetadata {
    ResponseMetadata {
        success: result.success || result.needs_input(),
        intent: Some(intent),
        action_result: Some(result),
        context,
    }
}

fn respond(
    conversation_id: String,
    response: String,
    needs_clarification: bool,
    clarification_prompt: Option<String>,
    metadata: ResponseMetadata,
) -> SupportResponse {
    SupportResponse {
        response,
        conversation_id,
        needs_clarification,
        clarification_prompt,
        metadata,
    }
}

fn clarify(
    conversation_id: String,
    prompt: String,
    intent: Intent,
    context: ConversationContext,
) -> SupportResponse {
    respond(
        conversation_id,
        prompt.clone(),
        true,
        Some(prompt),
        ResponseMetadata {
            success: true,
            intent: Some(intent),
            action_result: None,
            context: Some(context),
        },
    )
}

fn reask_selection(
    conversation_id: String,
    intent: Intent,
    candidates: Vec<OrderCandidate>,
) -> SupportResponse {
    let prompt = "I'm sorry, I didn't understand your selection. Please try again.".to_string();
    let context =
        ConversationContext { pending: Some(PendingStep::SelectOrder { intent, candidates }) };
    clarify(conversation_id, prompt, intent, context)
}

fn degraded(conversation_id: String) -> SupportResponse {
    respond(
        conversation_id,
        APOLOGY.to_string(),
        false,
        None,
        ResponseMetadata { success: false, ..Default::default() },
    )
}

/// A money token: `$12.50`, `$5`, or a bare decimal like `12.50`. Bare
/// integers are not accepted, they are indistinguishable from order numbers
/// and quantities.
pub fn extract_amount(message: &str) -> Option<Decimal> {
    for token in message.split_whitespace() {
        let trimmed = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.' && c != '$');
        let (candidate, dollar_prefixed) = match trimmed.strip_prefix('$') {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };
        if candidate.is_empty() || !candidate.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        if !dollar_prefixed && !candidate.contains('.') {
            continue;
        }
        if let Ok(amount) = Decimal::from_str(candidate.trim_end_matches('.')) {
            if amount > Decimal::ZERO {
                return Some(amount);
            }
        }
    }
    None
}

fn render_success(intent: Intent, result: &ActionResult) -> String {
    let payload = result.payload.as_ref();
    let field = |name: &str| payload.and_then(|p| p.get(name)).cloned();
    let text = |name: &str| {
        field(name).and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()
    };
    let number = |name: &str| field(name).and_then(|v| v.as_i64()).unwrap_or_default();

    match intent {
        Intent::Refund => format!(
            "Your refund of ${} for order #{} has been issued.{}",
            text("amount"),
            number("order_id"),
            if field("order_cancelled").and_then(|v| v.as_bool()).unwrap_or(false) {
                " The order has been cancelled."
            } else {
                ""
            }
        ),
        Intent::Cancel => format!("Order #{} has been cancelled.", number("order_id")),
        Intent::Replacement => format!(
            "I've initiated a replacement for order #{}. Your replacement order #{} has been \
             created and is pending processing.",
            number("original_order_id"),
            number("replacement_order_id")
        ),
        Intent::Escalate => format!(
            "I've escalated order #{} to a human agent, who will follow up with you shortly.",
            number("order_id")
        ),
        Intent::Status => format!(
            "Order #{} ({}) is currently {}. Ordered {}, total ${}.",
            number("order_id"),
            text("product_name"),
            text("status"),
            text("order_date"),
            text("amount")
        ),
        Intent::Other => APOLOGY.to_string(),
    }
}
