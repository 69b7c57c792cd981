pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "triage",
    about = "Slack triage agent operator CLI",
    long_about = "Inspect configuration, check credential readiness, and run messages or gateway events through the routing graph.",
    after_help = "Examples:\n  triage doctor --json\n  triage config\n  triage invoke \"The export button crashes\"\n  triage invoke --event event.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check that every required secret resolves")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one message (or one gateway event) through the routing graph")]
    Invoke {
        #[arg(help = "Message text to classify and answer", conflicts_with = "event")]
        message: Option<String>,
        #[arg(long, value_name = "FILE", help = "JSON gateway event to handle instead")]
        event: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Invoke { message, event } => match (message, event) {
            (_, Some(path)) => commands::invoke::run_event(&path),
            (Some(message), None) => commands::invoke::run_message(&message),
            (None, None) => commands::CommandResult::failure(
                "invoke",
                "usage",
                "provide a message or --event <FILE>",
                2,
            ),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
