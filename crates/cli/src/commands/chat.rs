use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use redress_agent::classifier::IntentClassifier;
use redress_agent::dispatch::ActionRegistry;
use redress_agent::llm::HttpLlmClient;
use redress_agent::lookup::{ExternalLookup, HttpLookupClient, NullLookup};
use redress_agent::resolver::OrderResolver;
use redress_agent::retriever::PolicyIndex;
use redress_agent::runtime::AgentRuntime;
use redress_core::audit::JsonlAuditSink;
use redress_core::config::AppConfig;
use redress_core::{ConversationContext, SupportRequest};
use redress_db::repositories::{SqlOrderRepository, SqlRefundRepository};

use crate::commands::{self, CliError, CommandResult};

/// Interactive support loop against the local database. Each turn round-trips
/// the previous response's conversation context, the same contract the HTTP
/// endpoint exposes.
pub fn run(user: i64) -> CommandResult {
    let outcome = commands::run_with_config(|config| async move {
        let (pool, _) = commands::open_database(&config).await?;

        let agent = build_agent(&config, pool.clone())
            .map_err(|(class, message)| CliError::new(class, message, 5))?;

        let turns = chat_loop(&agent, user).await.map_err(|error| {
            CliError::new("chat_session", format!("failed to read input: {error}"), 7)
        })?;

        pool.close().await;
        Ok(turns)
    });

    match outcome {
        Ok(turns) => {
            CommandResult::success("chat", format!("chat session ended after {turns} turns"))
        }
        Err(error) => CommandResult::from_error("chat", error),
    }
}

fn build_agent(
    config: &AppConfig,
    pool: redress_db::DbPool,
) -> Result<AgentRuntime, (&'static str, String)> {
    let index = PolicyIndex::build(&config.retriever)
        .map_err(|error| ("policy_index", error.to_string()))?;

    let orders = Arc::new(SqlOrderRepository::new(pool.clone()));
    let refunds = Arc::new(SqlRefundRepository::new(pool));

    let lookup: Arc<dyn ExternalLookup> = if config.lookup.enabled {
        Arc::new(
            HttpLookupClient::from_config(&config.lookup)
                .map_err(|error| ("lookup_client", error.to_string()))?,
        )
    } else {
        Arc::new(NullLookup)
    };

    let audit = Arc::new(
        JsonlAuditSink::open(&config.audit.log_path)
            .map_err(|error| ("audit_sink", error.to_string()))?,
    );
    let registry = ActionRegistry::with_default_handlers(orders.clone(), refunds, lookup, audit);

    let llm = Arc::new(
        HttpLlmClient::from_config(&config.llm)
            .map_err(|error| ("llm_client", error.to_string()))?,
    );
    let classifier = IntentClassifier::new(llm, Duration::from_secs(config.llm.timeout_secs));

    Ok(AgentRuntime::new(classifier, Arc::new(index), OrderResolver::new(orders), registry))
}

async fn chat_loop(agent: &AgentRuntime, user: i64) -> Result<usize, std::io::Error> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    println!("redress support chat (user {user}). Type `exit` to quit.");

    let mut conversation_id: Option<String> = None;
    let mut context: Option<ConversationContext> = None;
    let mut turns = 0usize;

    loop {
        write!(stdout, "you> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        let response = agent
            .handle(SupportRequest {
                user_input: message.to_string(),
                user_id: user,
                conversation_id: conversation_id.clone(),
                conversation_history: Vec::new(),
                context: context.take(),
            })
            .await;

        println!("agent> {}", response.response);

        conversation_id = Some(response.conversation_id);
        context = response.metadata.context;
        turns += 1;
    }

    Ok(turns)
}
