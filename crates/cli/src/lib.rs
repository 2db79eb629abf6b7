pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tabletalk",
    about = "Tabletalk operator CLI",
    long_about = "Operate the Tabletalk service: one-shot questions, SQL safety checks, demo warehouse seeding, config inspection, and readiness diagnostics.",
    after_help = "Examples:\n  tabletalk ask \"Who has the highest salary?\"\n  tabletalk check \"SELECT first_name FROM main.employees LIMIT 5\"\n  tabletalk doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Ask a one-shot question through the full routing workflow")]
    Ask {
        #[arg(help = "Natural-language question to route")]
        question: String,
    },
    #[command(about = "Run the SQL safety rules against the live schema snapshot")]
    Check {
        #[arg(help = "Candidate SQL statement to validate")]
        sql: String,
    },
    #[command(about = "Load the demo warehouse fixture and verify the seeded tables")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, warehouse connectivity, schema visibility, and model readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { question } => commands::ask::run(&question),
        Command::Check { sql } => commands::check::run(&sql),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
