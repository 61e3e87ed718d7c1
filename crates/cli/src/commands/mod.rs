pub mod chat;
pub mod doctor;
pub mod migrate;
pub mod seed;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use redress_core::config::{AppConfig, LoadOptions};
use redress_db::migrations::MigrationReport;
use redress_db::{connect, migrations, DbPool};

/// Outcome of one subcommand: the process exit code plus the JSON report
/// printed to stdout.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// Classified subcommand failure. The class keys scripted callers onto the
/// failure category; the exit code mirrors it for shell pipelines.
pub(crate) struct CliError {
    pub class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl CliError {
    pub fn new(class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { class, message: message.into(), exit_code }
    }
}

#[derive(Serialize)]
struct CommandReport<'a> {
    command: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    detail: Value,
}

impl CommandResult {
    pub fn success(command: &str, message: impl AsRef<str>) -> Self {
        Self::success_with_detail(command, message, Value::Null)
    }

    /// Success with a structured `detail` object for scripted consumers;
    /// `message` stays the human-readable line.
    pub fn success_with_detail(command: &str, message: impl AsRef<str>, detail: Value) -> Self {
        let report = CommandReport {
            command,
            status: "ok",
            error_class: None,
            message: message.as_ref(),
            detail,
        };
        Self { exit_code: 0, output: render_report(&report) }
    }

    pub(crate) fn from_error(command: &str, error: CliError) -> Self {
        let report = CommandReport {
            command,
            status: "error",
            error_class: Some(error.class),
            message: &error.message,
            detail: Value::Null,
        };
        Self { exit_code: error.exit_code, output: render_report(&report) }
    }
}

fn render_report(report: &CommandReport<'_>) -> String {
    serde_json::to_string(report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Shared front half of the database-touching subcommands: load config,
/// stand up a current-thread runtime (these are one-shot batch jobs with no
/// need for worker threads), and run the task to a classified outcome.
pub(crate) fn run_with_config<T, F, Fut>(task: F) -> Result<T, CliError>
where
    F: FnOnce(AppConfig) -> Fut,
    Fut: Future<Output = Result<T, CliError>>,
{
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CliError::new("config_validation", format!("configuration issue: {error}"), 2)
    })?;
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CliError::new("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
        })?;
    runtime.block_on(task(config))
}

/// Connects and brings the schema current, the precondition every
/// database-touching subcommand shares.
pub(crate) async fn open_database(
    config: &AppConfig,
) -> Result<(DbPool, MigrationReport), CliError> {
    let pool = connect(&config.database)
        .await
        .map_err(|error| CliError::new("db_connectivity", error.to_string(), 4))?;
    let report = migrations::run_pending(&pool)
        .await
        .map_err(|error| CliError::new("migration", error.to_string(), 5))?;
    Ok((pool, report))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CliError, CommandResult};

    #[test]
    fn success_report_omits_error_class_and_null_detail() {
        let result = CommandResult::success("migrate", "nothing to do");
        assert_eq!(result.exit_code, 0);
        assert!(!result.output.contains("error_class"));
        assert!(!result.output.contains("detail"));
    }

    #[test]
    fn detail_object_is_carried_verbatim() {
        let result = CommandResult::success_with_detail(
            "seed",
            "demo dataset loaded",
            json!({"users": 3, "orders": 7}),
        );
        let parsed: serde_json::Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(parsed["detail"]["orders"], 7);
        assert_eq!(parsed["status"], "ok");
    }

    #[test]
    fn failure_report_carries_class_and_exit_code() {
        let result = CommandResult::from_error(
            "migrate",
            CliError::new("db_connectivity", "no such file", 4),
        );
        assert_eq!(result.exit_code, 4);
        let parsed: serde_json::Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(parsed["error_class"], "db_connectivity");
        assert_eq!(parsed["status"], "error");
    }
}
