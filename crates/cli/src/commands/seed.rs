use serde_json::json;

use redress_db::fixtures::DemoSeedDataset;

use crate::commands::{self, CliError, CommandResult};

pub fn run() -> CommandResult {
    let outcome = commands::run_with_config(|config| async move {
        let (pool, _) = commands::open_database(&config).await?;

        // Loading the dataset twice trips primary-key conflicts, so check
        // whether it is already in place before touching the tables.
        let existing = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| CliError::new("seed_verification", error.to_string(), 6))?;

        let run_result = if existing.all_present {
            Ok(SeedOutput { users: 0, orders: 0, refunds: 0, already_loaded: true })
        } else {
            let loaded = DemoSeedDataset::load(&pool)
                .await
                .map_err(|error| CliError::new("seed_execution", error.to_string(), 5))?;

            let verification = DemoSeedDataset::verify(&pool)
                .await
                .map_err(|error| CliError::new("seed_verification", error.to_string(), 6))?;

            if verification.all_present {
                Ok(SeedOutput {
                    users: loaded.users,
                    orders: loaded.orders,
                    refunds: loaded.refunds,
                    already_loaded: false,
                })
            } else {
                Err(CliError::new(
                    "seed_verification",
                    verification_failure_message(&verification.checks),
                    6,
                ))
            }
        };

        pool.close().await;
        run_result
    });

    match outcome {
        Ok(output) if output.already_loaded => {
            CommandResult::success("seed", "demo dataset already loaded; nothing to do")
        }
        Ok(output) => CommandResult::success_with_detail(
            "seed",
            format!(
                "demo dataset loaded: {} users, {} orders, {} refund records",
                output.users, output.orders, output.refunds
            ),
            json!({
                "users": output.users,
                "orders": output.orders,
                "refunds": output.refunds,
            }),
        ),
        Err(error) => CommandResult::from_error("seed", error),
    }
}

struct SeedOutput {
    users: i64,
    orders: i64,
    refunds: i64,
    already_loaded: bool,
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_failure_message;

    #[test]
    fn failure_message_names_failed_checks() {
        let checks = [("users", true), ("orders", false), ("key-order", false)];
        assert_eq!(
            verification_failure_message(&checks),
            "Seed verification failed for checks: orders, key-order"
        );
    }

    #[test]
    fn failure_message_falls_back_when_no_labels() {
        let checks = [("users", true), ("orders", true)];
        assert_eq!(verification_failure_message(&checks), "Some seed data failed to load");
    }
}
