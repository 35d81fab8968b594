pub mod commands;

use std::process::ExitCode;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use cookhouse_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing::Level;

use crate::commands::resolve::ResolveArgs;

#[derive(Debug, Parser)]
#[command(
    name = "cookhouse",
    about = "Cookhouse complaint lifecycle operator CLI",
    long_about = "Escalate overdue complaints, apply admin resolutions, inspect cook records, and manage the database schema.",
    after_help = "Examples:\n  cookhouse escalate\n  cookhouse resolve --complaint C-1 --type warning --notes \"Unprofessional communication noted.\" --actor admin-1\n  cookhouse cook-record --cook cook-1\n  cookhouse doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Escalate every open complaint older than the SLA window")]
    Escalate,
    #[command(about = "Apply an admin decision to an escalated complaint")]
    Resolve(ResolveArgs),
    #[command(about = "Show warnings, complaint count and prior suspensions for a cook")]
    CookRecord {
        #[arg(long, help = "Identifier of the cook")]
        cook: String,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, notification templates, and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

/// Logs go to stderr; stdout carries exactly one result document.
fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!("failed to install log subscriber: {error}"))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Commands report configuration problems themselves.
    let logging_config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    if let Err(error) = init_logging(&logging_config) {
        eprintln!("{error}");
    }

    let result = match cli.command {
        Command::Escalate => commands::escalate::run(),
        Command::Resolve(args) => commands::resolve::run(args),
        Command::CookRecord { cook } => commands::cook_record::run(cook),
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
