pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "redress",
    about = "Redress operator CLI",
    long_about = "Operate redress migrations, demo data, readiness checks, and a local chat loop.",
    after_help = "Examples:\n  redress doctor --json\n  redress seed\n  redress chat --user 2"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset (users, orders, refund history)")]
    Seed,
    #[command(about = "Run an interactive support chat against the local database")]
    Chat {
        #[arg(long, default_value_t = 1, help = "Customer user id for the session")]
        user: i64,
    },
    #[command(about = "Validate config, database connectivity, and the policy corpus")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Chat { user } => commands::chat::run(user),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
