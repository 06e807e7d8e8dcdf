// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Triage CLI
//!
//! The `triage` binary runs supervisor-coordinated incident investigations
//! in-process.
//!
//! ## Commands
//!
//! - `triage investigate "<question>"` - Run one investigation and print the report
//! - `triage chat` - Interactive session; memory persists for the life of the process
//! - `triage health` - Check configured LLM providers
//! - `triage config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use triage_orchestrator::commands::{self, ChatArgs, ConfigCommand, InvestigateArgs};
use triage_orchestrator_core::domain::config::InvestigatorConfigManifest;

/// Triage - multi-agent incident investigation
#[derive(Parser)]
#[command(name = "triage")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TRIAGE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "TRIAGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, json); overrides the config file
    #[arg(long, global = true, env = "TRIAGE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single investigation
    #[command(name = "investigate")]
    Investigate(InvestigateArgs),

    /// Interactive investigation session
    #[command(name = "chat")]
    Chat(ChatArgs),

    /// Check reachability of configured LLM providers
    #[command(name = "health")]
    Health,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let command = match cli.command {
        // Config commands report their own load errors.
        Some(Commands::Config { command }) => {
            init_logging(
                cli.log_level.as_deref().unwrap_or("warn"),
                cli.log_format.as_deref().unwrap_or("compact"),
            )?;
            return commands::config::handle_command(command, cli.config).await;
        }
        Some(command) => command,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    };

    let manifest = InvestigatorConfigManifest::load_or_default(cli.config)
        .context("Failed to load configuration")?;
    let logging = manifest
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.logging.clone());
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "warn".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| logging.as_ref().map(|l| l.format.clone()))
        .unwrap_or_else(|| "compact".to_string());
    init_logging(&level, &format)?;

    manifest.validate().context("Configuration validation failed")?;

    match command {
        Commands::Investigate(args) => commands::investigate::execute(args, &manifest.spec).await,
        Commands::Chat(args) => commands::chat::execute(args, &manifest.spec).await,
        Commands::Health => commands::investigate::health(&manifest.spec).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Initialize tracing subscriber for logging. Logs go to stderr so reports
/// on stdout stay machine-readable.
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().with_target(true).init(),
        "compact" => builder.with_target(false).compact().init(),
        other => anyhow::bail!("Unsupported log format '{}'. Use 'compact' or 'json'", other),
    }

    Ok(())
}
