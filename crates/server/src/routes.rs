use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use redress_agent::runtime::AgentRuntime;
use redress_core::action::{SupportRequest, SupportResponse};

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/support/resolve", post(resolve)).with_state(runtime)
}

/// The single inbound surface: one request in, one response out. The runtime
/// guarantees a response on every path, so this handler never fails.
pub async fn resolve(
    State(runtime): State<Arc<AgentRuntime>>,
    Json(request): Json<SupportRequest>,
) -> Json<SupportResponse> {
    info!(user_id = request.user_id, "support request received");
    Json(runtime.handle(request).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tower::util::ServiceExt;

    use redress_agent::classifier::IntentClassifier;
    use redress_agent::dispatch::ActionRegistry;
    use redress_agent::llm::{LlmClient, LlmError};
    use redress_agent::lookup::NullLookup;
    use redress_agent::resolver::OrderResolver;
    use redress_agent::retriever::PolicyIndex;
    use redress_agent::runtime::AgentRuntime;
    use redress_core::audit::InMemoryAuditSink;
    use redress_core::config::RetrieverConfig;
    use redress_core::domain::order::OrderStatus;
    use redress_core::domain::user::UserId;
    use redress_db::repositories::{
        InMemoryOrderRepository, InMemoryRefundRepository, NewOrder, OrderRepository,
    };

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    async fn test_runtime(intent_word: &'static str) -> (Arc<AgentRuntime>, i64) {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let order = orders
            .insert(NewOrder {
                user_id: UserId(1),
                product_id: 1,
                product_name: Some("Mechanical Keyboard".to_string()),
                amount: Decimal::new(12900, 2),
                status: OrderStatus::Pending,
                order_date: Utc::now(),
                shipping_address: None,
                replacement_of: None,
            })
            .await
            .expect("insert");
        let refunds = Arc::new(InMemoryRefundRepository::new(orders.clone()));
        let registry = ActionRegistry::with_default_handlers(
            orders.clone(),
            refunds,
            Arc::new(NullLookup),
            Arc::new(InMemoryAuditSink::default()),
        );
        let index = PolicyIndex::build(&RetrieverConfig {
            policy_dir: "/nonexistent".into(),
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 2,
        })
        .expect("empty index");
        let runtime = AgentRuntime::new(
            IntentClassifier::new(Arc::new(FixedLlm(intent_word)), Duration::from_secs(5)),
            Arc::new(index),
            OrderResolver::new(orders),
            registry,
        );
        (Arc::new(runtime), order.id.0)
    }

    #[tokio::test]
    async fn resolve_endpoint_round_trips_json() {
        let (runtime, order_id) = test_runtime("cancel").await;
        let router = super::router(runtime);

        let body = serde_json::json!({
            "user_input": format!("please cancel order {order_id}"),
            "user_id": 1,
        });
        let response = router
            .oneshot(
                Request::post("/support/resolve")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["needs_clarification"], false);
        assert_eq!(payload["metadata"]["success"], true);
        assert!(payload["response"].as_str().expect("text").contains("cancelled"));
        assert!(!payload["conversation_id"].as_str().expect("id").is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_before_the_runtime() {
        let (runtime, _) = test_runtime("cancel").await;
        let router = super::router(runtime);

        let response = router
            .oneshot(
                Request::post("/support/resolve")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"user_id\": 1}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
