use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use redress_core::errors::ActionError;
use redress_core::intent::Intent;

use crate::llm::LlmClient;

const PROMPT_TEMPLATE: &str = "You are a customer support intent classifier.\n\
Classify the customer message into exactly one of these intents:\n\
refund, cancel, replacement, escalate, status, other.\n\n\
Relevant store policy:\n{policy}\n\n\
Customer message:\n{message}\n\n\
Reply with the single intent word and nothing else.";

/// Classifies a redacted customer message via the LLM port. The call is
/// timeout-bounded and retried at most once; the read is idempotent so the
/// retry cannot duplicate side effects.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn prompt(redacted_message: &str, policy_context: &str) -> String {
        let policy = if policy_context.is_empty() { "(none)" } else { policy_context };
        PROMPT_TEMPLATE.replace("{policy}", policy).replace("{message}", redacted_message)
    }

    pub async fn classify(
        &self,
        redacted_message: &str,
        policy_context: &str,
    ) -> Result<Intent, ActionError> {
        let prompt = Self::prompt(redacted_message, policy_context);

        let mut last_failure = String::new();
        for attempt in 0..2 {
            match tokio::time::timeout(self.timeout, self.llm.complete(&prompt)).await {
                Ok(Ok(response)) => return Ok(Intent::from_model_response(&response)),
                Ok(Err(error)) => {
                    warn!(attempt, %error, "intent classification call failed");
                    last_failure = error.to_string();
                }
                Err(_) => {
                    warn!(attempt, timeout_secs = self.timeout.as_secs(), "intent classification timed out");
                    last_failure = format!("classification timed out after {:?}", self.timeout);
                }
            }
        }

        Err(ActionError::Transient(last_failure))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use redress_core::errors::ActionError;
    use redress_core::intent::Intent;

    use crate::llm::{LlmClient, LlmError};

    use super::IntentClassifier;

    struct ScriptedLlm {
        calls: AtomicU32,
        fail_first: u32,
        response: &'static str,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(LlmError::Api { status: 503, body: "overloaded".to_string() })
            } else {
                Ok(self.response.to_string())
            }
        }
    }

    #[tokio::test]
    async fn classifies_through_the_parsing_fallback_chain() {
        let llm = Arc::new(ScriptedLlm {
            calls: AtomicU32::new(0),
            fail_first: 0,
            response: "I believe this is a REFUND request.",
        });
        let classifier = IntentClassifier::new(llm, Duration::from_secs(5));
        let intent = classifier.classify("my bottle leaked", "").await.expect("classify");
        assert_eq!(intent, Intent::Refund);
    }

    #[tokio::test]
    async fn retries_once_after_a_failed_call() {
        let llm = Arc::new(ScriptedLlm {
            calls: AtomicU32::new(0),
            fail_first: 1,
            response: "cancel",
        });
        let classifier = IntentClassifier::new(llm.clone(), Duration::from_secs(5));
        let intent = classifier.classify("stop my order", "").await.expect("classify");
        assert_eq!(intent, Intent::Cancel);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn two_failures_surface_as_transient() {
        let llm =
            Arc::new(ScriptedLlm { calls: AtomicU32::new(0), fail_first: 2, response: "status" });
        let classifier = IntentClassifier::new(llm.clone(), Duration::from_secs(5));
        let error = classifier.classify("where is it", "").await.expect_err("should fail");
        assert!(matches!(error, ActionError::Transient(_)));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prompt_includes_policy_context() {
        let prompt = IntentClassifier::prompt("message", "Refunds allowed within 30 days.");
        assert!(prompt.contains("Refunds allowed within 30 days."));
        assert!(prompt.contains("message"));
    }
}
