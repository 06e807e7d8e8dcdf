// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use triage_orchestrator_core::domain::config::{InvestigatorConfigManifest, ToolGatewayMode};

const TEMPLATE: &str = include_str!("../../templates/triage-config.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./triage-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. TRIAGE_CONFIG_PATH: {}",
            std::env::var("TRIAGE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./triage-config.yaml");
        println!("  4. ~/.triage/config.yaml");
        println!("  5. /etc/triage/config.yaml");
        println!();
    }

    let manifest = InvestigatorConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let config = &manifest.spec;

    println!("{} {}", "Configuration:".bold(), manifest.metadata.name);
    println!();

    println!("{}", "Domains:".bold());
    for domain in &config.domains {
        println!("  {} - {}", domain.name.bold(), domain.description);
        if !domain.keywords.is_empty() {
            println!("    Keywords: {}", domain.keywords.join(", "));
        }
        let tools: Vec<&str> = domain.tools.iter().map(|t| t.name.as_str()).collect();
        println!("    Tools: {}", tools.join(", "));
    }
    println!();

    println!("{}", "LLM Providers:".bold());
    for provider in &config.llm_providers {
        let state = if provider.enabled { "" } else { " (disabled)" };
        println!("  {} ({}){}", provider.name.bold(), provider.provider_type, state);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!(
        "  Planner alias: {}, worker alias: {}",
        config.llm_selection.planner_alias, config.llm_selection.worker_alias
    );
    if let Some(fallback) = &config.llm_selection.fallback_provider {
        println!("  Fallback provider: {}", fallback);
    }
    println!();

    println!("{}", "Tool Gateway:".bold());
    match config.tool_gateway.mode {
        ToolGatewayMode::Local => println!("  Mode: local (configured fixtures)"),
        ToolGatewayMode::Remote => println!(
            "  Mode: remote ({})",
            config.tool_gateway.endpoint.as_deref().unwrap_or("no endpoint")
        ),
    }
    println!();

    let timeouts = &config.timeouts;
    println!("{}", "Timeouts:".bold());
    println!("  Task: {}", humanize(timeouts.task));
    println!("  Request: {}", humanize(timeouts.request));
    println!("  Tool call: {}", humanize(timeouts.tool_call));
    println!("  Cancellation grace: {}", humanize(timeouts.cancellation_grace));
    println!();

    Ok(())
}

fn humanize(duration: std::time::Duration) -> String {
    format!("{:?}", duration)
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let manifest = InvestigatorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    manifest
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    std::fs::write(output, TEMPLATE)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
