use serde_json::json;

use redress_db::migrations::MigrationReport;

use crate::commands::{self, CommandResult};

pub fn run() -> CommandResult {
    let outcome = commands::run_with_config(|config| async move {
        let (pool, report) = commands::open_database(&config).await?;
        pool.close().await;
        Ok(report)
    });

    match outcome {
        Ok(report) => CommandResult::success_with_detail(
            "migrate",
            describe(&report),
            json!({
                "newly_applied": report.newly_applied,
                "total_applied": report.total_applied,
                "schema_version": report.latest_version,
            }),
        ),
        Err(error) => CommandResult::from_error("migrate", error),
    }
}

fn describe(report: &MigrationReport) -> String {
    match (report.newly_applied, report.latest_version) {
        (0, Some(version)) => format!("schema already current at version {version}"),
        (0, None) => "no migrations defined; nothing to apply".to_string(),
        (n, Some(version)) => format!("applied {n} migration(s); schema now at version {version}"),
        // run_pending cannot apply migrations without recording a version.
        (n, None) => format!("applied {n} migration(s)"),
    }
}

#[cfg(test)]
mod tests {
    use redress_db::migrations::MigrationReport;

    use super::describe;

    #[test]
    fn fresh_database_names_what_was_applied() {
        let report =
            MigrationReport { newly_applied: 1, total_applied: 1, latest_version: Some(1) };
        assert_eq!(describe(&report), "applied 1 migration(s); schema now at version 1");
    }

    #[test]
    fn up_to_date_schema_reports_its_version() {
        let report =
            MigrationReport { newly_applied: 0, total_applied: 1, latest_version: Some(1) };
        assert_eq!(describe(&report), "schema already current at version 1");
    }
}
