// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Single-shot investigation and provider health commands

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use triage_orchestrator_core::application::{InvestigationService, StandardInvestigationService};
use triage_orchestrator_core::domain::config::InvestigatorConfig;
use triage_orchestrator_core::domain::investigation::InvestigationRequest;
use triage_orchestrator_core::infrastructure::event_bus::EventBusError;

use super::{describe_event, parse_assignments, render_report};

#[derive(Args)]
pub struct InvestigateArgs {
    /// The question to investigate
    #[arg(value_name = "QUESTION")]
    pub query: String,

    /// User the investigation runs for
    #[arg(short, long, env = "TRIAGE_USER", default_value = "default")]
    pub user: String,

    /// Conversation session id
    #[arg(short, long)]
    pub session: Option<String>,

    /// Preference overrides stored before the run (e.g. verbosity=brief)
    #[arg(long = "pref", value_name = "KEY=VALUE")]
    pub prefs: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Stream progress events to stderr
    #[arg(short, long)]
    pub follow: bool,
}

pub async fn execute(args: InvestigateArgs, config: &InvestigatorConfig) -> Result<()> {
    let service = StandardInvestigationService::from_config(config)
        .context("Failed to initialize investigation service")?;

    if !args.prefs.is_empty() {
        let attributes = parse_assignments(&args.prefs)?;
        service
            .remember_preferences(&args.user, attributes)
            .await
            .context("Failed to store preferences")?;
    }

    let follower = if args.follow {
        let mut receiver = service.subscribe();
        Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => eprintln!("{} {}", "›".dimmed(), describe_event(&event)),
                    Err(EventBusError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        }))
    } else {
        None
    };

    let request = InvestigationRequest::new(
        args.query,
        args.user,
        args.session.unwrap_or_default(),
    );
    info!(user_id = %request.user_id, "Starting investigation");
    let result = service.investigate(request).await;

    if let Some(handle) = follower {
        handle.abort();
    }

    let report = result.context("Investigation failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_report(&report));
    }

    Ok(())
}

pub async fn health(config: &InvestigatorConfig) -> Result<()> {
    let service = StandardInvestigationService::from_config(config)
        .context("Failed to initialize investigation service")?;

    let mut results: Vec<_> = service.provider_health().await.into_iter().collect();
    if results.is_empty() {
        println!("{}", "No LLM providers configured".yellow());
        return Ok(());
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut healthy = true;
    for (name, result) in results {
        match result {
            Ok(()) => println!("{} {}", "✓".green(), name.bold()),
            Err(e) => {
                healthy = false;
                println!("{} {}: {}", "✗".red(), name.bold(), e);
            }
        }
    }

    if !healthy {
        anyhow::bail!("One or more LLM providers are unreachable");
    }
    Ok(())
}
