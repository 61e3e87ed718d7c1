use std::path::Path;

use redress_core::config::{AppConfig, LoadOptions};
use redress_db::connect;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_database_connectivity(&config));
            checks.push(check_policy_corpus(&config.retriever.policy_dir));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "policy_corpus",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

/// The retriever degrades to an empty index when the corpus is missing, so
/// this is the one place that surfaces a missing or empty policy directory.
fn check_policy_corpus(policy_dir: &Path) -> DoctorCheck {
    if !policy_dir.is_dir() {
        return DoctorCheck {
            name: "policy_corpus",
            status: CheckStatus::Fail,
            details: format!("policy directory `{}` does not exist", policy_dir.display()),
        };
    }

    let documents = match count_policy_documents(policy_dir) {
        Ok(count) => count,
        Err(error) => {
            return DoctorCheck {
                name: "policy_corpus",
                status: CheckStatus::Fail,
                details: format!(
                    "could not read policy directory `{}`: {error}",
                    policy_dir.display()
                ),
            };
        }
    };

    if documents == 0 {
        DoctorCheck {
            name: "policy_corpus",
            status: CheckStatus::Fail,
            details: format!(
                "policy directory `{}` contains no .md or .txt documents",
                policy_dir.display()
            ),
        }
    } else {
        DoctorCheck {
            name: "policy_corpus",
            status: CheckStatus::Pass,
            details: format!("{documents} policy documents in `{}`", policy_dir.display()),
        }
    }
}

fn count_policy_documents(policy_dir: &Path) -> Result<usize, std::io::Error> {
    let mut count = 0;
    for entry in std::fs::read_dir(policy_dir)? {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map_or(false, |extension| extension == "md" || extension == "txt");
        if path.is_file() && supported {
            count += 1;
        }
    }
    Ok(count)
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{check_policy_corpus, CheckStatus};

    #[test]
    fn missing_policy_directory_fails() {
        let check = check_policy_corpus(std::path::Path::new("no-such-policy-dir"));
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.details.contains("does not exist"));
    }

    #[test]
    fn populated_policy_directory_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("refund_policy.md"), "Refunds within 30 days.")
            .expect("write policy");
        std::fs::write(dir.path().join("notes.bin"), [0u8, 1]).expect("write binary");

        let check = check_policy_corpus(dir.path());
        assert_eq!(check.status, CheckStatus::Pass);
        assert!(check.details.starts_with("1 policy documents"));
    }

    #[test]
    fn empty_policy_directory_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let check = check_policy_corpus(dir.path());
        assert_eq!(check.status, CheckStatus::Fail);
    }
}
