use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use redress_agent::classifier::IntentClassifier;
use redress_agent::dispatch::ActionRegistry;
use redress_agent::llm::{HttpLlmClient, LlmError};
use redress_agent::lookup::{ExternalLookup, HttpLookupClient, LookupError, NullLookup};
use redress_agent::resolver::OrderResolver;
use redress_agent::retriever::{PolicyIndex, RetrieverError};
use redress_agent::runtime::AgentRuntime;
use redress_core::audit::{AuditError, JsonlAuditSink};
use redress_core::config::{AppConfig, ConfigError, LoadOptions};
use redress_db::repositories::{SqlOrderRepository, SqlRefundRepository};
use redress_db::{connect, migrations, DbPool};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("policy index build failed: {0}")]
    PolicyIndex(#[from] RetrieverError),
    #[error("audit sink open failed: {0}")]
    AuditSink(#[from] AuditError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("lookup client setup failed: {0}")]
    Lookup(#[from] LookupError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");

    let db_pool =
        connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!("database connection established");

    let migration = migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        newly_applied = migration.newly_applied,
        schema_version = migration.latest_version,
        "database migrations applied"
    );

    let index = Arc::new(PolicyIndex::build(&config.retriever)?);
    info!(empty = index.is_empty(), "policy index built");

    let runtime = Arc::new(build_runtime(&config, db_pool.clone(), index)?);

    Ok(Application { config, db_pool, runtime })
}

fn build_runtime(
    config: &AppConfig,
    db_pool: DbPool,
    index: Arc<PolicyIndex>,
) -> Result<AgentRuntime, BootstrapError> {
    let orders = Arc::new(SqlOrderRepository::new(db_pool.clone()));
    let refunds = Arc::new(SqlRefundRepository::new(db_pool));

    let lookup: Arc<dyn ExternalLookup> = if config.lookup.enabled {
        Arc::new(HttpLookupClient::from_config(&config.lookup)?)
    } else {
        Arc::new(NullLookup)
    };

    let audit = Arc::new(JsonlAuditSink::open(&config.audit.log_path)?);
    let registry =
        ActionRegistry::with_default_handlers(orders.clone(), refunds, lookup, audit);

    let llm = Arc::new(HttpLlmClient::from_config(&config.llm)?);
    let classifier = IntentClassifier::new(
        llm,
        std::time::Duration::from_secs(config.llm.timeout_secs),
    );

    Ok(AgentRuntime::new(classifier, index, OrderResolver::new(orders), registry))
}
