use std::sync::Arc;

use redress_core::action::OrderCandidate;
use redress_core::domain::order::{Order, OrderId, OrderStatus};
use redress_core::domain::user::UserId;
use redress_core::errors::ActionError;

use redress_db::repositories::OrderRepository;

/// At most this many candidates are offered during clarification.
const MAX_CANDIDATES: usize = 5;

/// Tokens accepted as "yes" when confirming a single candidate.
const AFFIRMATIVES: &[&str] = &["y", "yes", "yeah", "yep"];

/// Words that never identify a product.
const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "again", "against", "all", "an", "and", "any", "are", "be", "been",
    "before", "being", "between", "both", "but", "can", "cancel", "could", "did", "do", "does",
    "doing", "down", "during", "each", "few", "for", "from", "further", "had", "has", "have",
    "having", "he", "her", "here", "hers", "him", "his", "how", "into", "is", "it", "its", "just",
    "may", "me", "might", "mine", "more", "most", "must", "my", "no", "nor", "not", "now", "off",
    "once", "only", "or", "order", "other", "our", "ours", "over", "own", "please", "refund",
    "replace", "replacement", "same", "shall", "she", "should", "so", "some", "status", "such",
    "than", "that", "the", "their", "theirs", "them", "then", "there", "these", "they", "this",
    "those", "through", "too", "under", "us", "very", "want", "was", "we", "were", "what", "when",
    "where", "which", "who", "whom", "whose", "why", "will", "with", "would", "you", "your",
    "yours",
];

/// How the resolver answered "which order is this about?".
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// An explicit order number appeared in the message.
    Resolved(OrderId),
    /// One or more product-name matches; the user must pick or confirm.
    Clarification { prompt: String, candidates: Vec<OrderCandidate> },
    /// Nothing matched; ask for the order number.
    NotFound(String),
}

pub struct OrderResolver {
    orders: Arc<dyn OrderRepository>,
}

impl OrderResolver {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// Two-step resolution: a direct order number wins without touching the
    /// store; otherwise product terms are matched against the user's orders.
    pub async fn resolve(
        &self,
        user_id: UserId,
        message: &str,
        status: Option<OrderStatus>,
    ) -> Result<Resolution, ActionError> {
        if let Some(order_id) = extract_order_id(message) {
            return Ok(Resolution::Resolved(order_id));
        }

        let terms = extract_product_terms(message);
        if terms.is_empty() {
            return Ok(Resolution::NotFound(
                "I couldn't find an order number in your message. Could you please provide \
                 the order number or be more specific about the product?"
                    .to_string(),
            ));
        }

        let matches = self
            .orders
            .search_for_user(user_id, &terms, status)
            .await
            .map_err(|error| ActionError::Transient(error.to_string()))?;
        if matches.is_empty() {
            return Ok(Resolution::NotFound(
                "I couldn't find any matching orders. Could you please provide the order number?"
                    .to_string(),
            ));
        }

        let candidates: Vec<OrderCandidate> =
            matches.iter().take(MAX_CANDIDATES).map(to_candidate).collect();

        if candidates.len() == 1 {
            let candidate = &candidates[0];
            let prompt = format!(
                "I found an order for {}. Is this the order you're referring to?",
                candidate.product_name
            );
            return Ok(Resolution::Clarification { prompt, candidates });
        }

        let mut lines = vec!["I found multiple orders that might match:".to_string()];
        for (index, candidate) in candidates.iter().enumerate() {
            lines.push(format!("{}. {}", index + 1, format_order_suggestion(candidate)));
        }
        lines.push(
            "Please specify which order you're referring to by number or provide more details."
                .to_string(),
        );
        Ok(Resolution::Clarification { prompt: lines.join("\n"), candidates })
    }
}

/// Parse the user's reply to a clarification prompt: a number within range,
/// or an affirmative when there is exactly one candidate.
pub fn resolve_selection(input: &str, candidates: &[OrderCandidate]) -> Option<OrderId> {
    let trimmed = input.trim();
    if let Ok(selection) = trimmed.parse::<usize>() {
        if selection >= 1 && selection <= candidates.len() {
            return Some(candidates[selection - 1].order_id);
        }
        return None;
    }

    if candidates.len() == 1 && AFFIRMATIVES.contains(&trimmed.to_lowercase().as_str()) {
        return Some(candidates[0].order_id);
    }

    None
}

pub fn to_candidate(order: &Order) -> OrderCandidate {
    OrderCandidate {
        order_id: order.id,
        product_name: order.product_name.clone().unwrap_or_else(|| "product".to_string()),
        status: order.status.as_str().to_string(),
        order_date: order.order_date.format("%Y-%m-%d").to_string(),
        amount: order.amount.to_string(),
    }
}

fn format_order_suggestion(candidate: &OrderCandidate) -> String {
    format!(
        "Order #{}: {} ({}) ordered {} - ${}",
        candidate.order_id.0,
        candidate.product_name,
        candidate.status,
        candidate.order_date,
        candidate.amount
    )
}

/// First run of 4 or more consecutive digits, if any. The "order" / "#"
/// prefix customers often type is irrelevant to the match itself.
pub fn extract_order_id(message: &str) -> Option<OrderId> {
    let mut run = String::new();
    for c in message.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            run.push(c);
            continue;
        }
        if run.len() >= 4 {
            if let Ok(id) = run.parse::<i64>() {
                return Some(OrderId(id));
            }
        }
        run.clear();
    }
    None
}

/// Lowercased tokens minus stop words and anything of length 2 or less.
pub fn extract_product_terms(message: &str) -> Vec<String> {
    message
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(str::to_lowercase)
        .filter(|word| word.len() > 2 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use redress_core::domain::order::{OrderId, OrderStatus};
    use redress_core::domain::user::UserId;

    use redress_db::repositories::{InMemoryOrderRepository, NewOrder, OrderRepository};

    use super::{
        extract_order_id, extract_product_terms, resolve_selection, to_candidate, OrderResolver,
        Resolution,
    };

    fn shipped(product: &str) -> NewOrder {
        NewOrder {
            user_id: UserId(1),
            product_id: 9,
            product_name: Some(product.to_string()),
            amount: Decimal::new(2499, 2),
            status: OrderStatus::Shipped,
            order_date: Utc::now(),
            shipping_address: None,
            replacement_of: None,
        }
    }

    #[test]
    fn direct_order_number_wins() {
        assert_eq!(extract_order_id("cancel order 10023 please"), Some(OrderId(10023)));
        assert_eq!(extract_order_id("cancel #4411"), Some(OrderId(4411)));
        assert_eq!(extract_order_id("my pin is 123"), None);
    }

    #[test]
    fn product_terms_drop_stop_words_and_short_tokens() {
        let terms = extract_product_terms("I want to cancel my water bottle order");
        assert_eq!(terms, vec!["water".to_string(), "bottle".to_string()]);
    }

    #[tokio::test]
    async fn order_number_bypasses_product_search() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let resolver = OrderResolver::new(orders);
        let resolution =
            resolver.resolve(UserId(1), "refund order 55001", None).await.expect("resolve");
        assert_eq!(resolution, Resolution::Resolved(OrderId(55001)));
    }

    #[tokio::test]
    async fn single_match_asks_for_confirmation_not_auto_accept() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        orders.insert(shipped("Stainless Water Bottle")).await.expect("insert");
        let resolver = OrderResolver::new(orders);

        let resolution = resolver
            .resolve(UserId(1), "my water bottle arrived dented", Some(OrderStatus::Shipped))
            .await
            .expect("resolve");
        match resolution {
            Resolution::Clarification { prompt, candidates } => {
                assert_eq!(candidates.len(), 1);
                assert!(prompt.contains("Is this the order"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_matches_list_numbered_candidates() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        orders.insert(shipped("Stainless Water Bottle")).await.expect("insert");
        orders.insert(shipped("Insulated Bottle Carrier")).await.expect("insert");
        let resolver = OrderResolver::new(orders);

        let resolution = resolver
            .resolve(UserId(1), "problem with my bottle", Some(OrderStatus::Shipped))
            .await
            .expect("resolve");
        match resolution {
            Resolution::Clarification { prompt, candidates } => {
                assert_eq!(candidates.len(), 2);
                assert!(prompt.contains("1."));
                assert!(prompt.contains("2."));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_match_asks_for_the_order_number() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let resolver = OrderResolver::new(orders);
        let resolution =
            resolver.resolve(UserId(1), "problem with my gramophone", None).await.expect("resolve");
        assert!(matches!(resolution, Resolution::NotFound(_)));
    }

    #[tokio::test]
    async fn selection_accepts_number_or_affirmative() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let one = orders.insert(shipped("Stainless Water Bottle")).await.expect("insert");
        let two = orders.insert(shipped("Ceramic Mug Set")).await.expect("insert");
        let candidates = vec![to_candidate(&one), to_candidate(&two)];

        assert_eq!(resolve_selection("2", &candidates), Some(two.id));
        assert_eq!(resolve_selection("3", &candidates), None);
        assert_eq!(resolve_selection("yes", &candidates), None);

        let single = vec![to_candidate(&one)];
        assert_eq!(resolve_selection("yes", &single), Some(one.id));
        assert_eq!(resolve_selection("YEP", &single), Some(one.id));
        assert_eq!(resolve_selection("maybe", &single), None);
    }
}
