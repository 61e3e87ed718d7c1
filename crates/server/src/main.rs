mod bootstrap;
mod health;
mod routes;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use redress_core::config::{AppConfig, LoadOptions};

/// `RUST_LOG` directives take precedence; the configured level is the
/// default when the variable is unset.
fn log_filter(env_directives: Option<&str>, configured_level: &str) -> EnvFilter {
    match env_directives {
        Some(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(configured_level),
    }
}

fn init_logging(config: &AppConfig) {
    use redress_core::config::LogFormat::*;

    let filter =
        log_filter(std::env::var("RUST_LOG").ok().as_deref(), &config.logging.level);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other work.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = routes::router(app.runtime.clone()).merge(health::router(app.db_pool.clone()));
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(bind_address = %address, "redress-server started");

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;
    tracing::info!("redress-server stopping");

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
