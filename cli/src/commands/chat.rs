// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Interactive investigation session
//!
//! Every line is investigated within one session, so the planner sees the
//! conversation so far and history accumulates across questions. Lines
//! starting with `/` are session commands.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use triage_orchestrator_core::application::{InvestigationService, StandardInvestigationService};
use triage_orchestrator_core::domain::config::InvestigatorConfig;
use triage_orchestrator_core::domain::investigation::InvestigationRequest;
use triage_orchestrator_core::domain::session::Role;

use super::{parse_assignments, render_report};

const HELP: &str = "Commands:\n  /prefs KEY=VALUE...  store preferences (verbosity, format, include_escalation, escalation_contact, severity_threshold)\n  /history             show this session's conversation\n  /help                show this help\n  /quit                leave the session";

#[derive(Args)]
pub struct ChatArgs {
    /// User the session belongs to
    #[arg(short, long, env = "TRIAGE_USER", default_value = "default")]
    pub user: String,

    /// Session id (default: generated from the current time)
    #[arg(short, long)]
    pub session: Option<String>,
}

pub async fn execute(args: ChatArgs, config: &InvestigatorConfig) -> Result<()> {
    let service = StandardInvestigationService::from_config(config)
        .context("Failed to initialize investigation service")?;
    let session = args
        .session
        .unwrap_or_else(|| Utc::now().format("chat-%Y%m%d%H%M%S").to_string());

    println!(
        "{} session {} for {}. Type /help for commands.",
        "Triage".bold(),
        session.cyan(),
        args.user.cyan()
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    run_session(&service, &args.user, &session, stdin, &mut stdout).await
}

/// Drive a session from `input` until EOF or `/quit`.
pub async fn run_session<R, W>(
    service: &dyn InvestigationService,
    user_id: &str,
    session_id: &str,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "\n{} ", ">".bold())?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            match parts.next().unwrap_or_default() {
                "quit" | "exit" => break,
                "help" => writeln!(out, "{}", HELP)?,
                "history" => match service.conversation(session_id).await {
                    Ok(messages) if messages.is_empty() => writeln!(out, "{}", "(no messages yet)".dimmed())?,
                    Ok(messages) => {
                        for message in messages {
                            let role = match message.role {
                                Role::User => "user".cyan(),
                                Role::Assistant => "assistant".green(),
                                Role::Tool => "tool".dimmed(),
                            };
                            writeln!(out, "{}: {}", role, message.content)?;
                        }
                    }
                    Err(e) => writeln!(out, "{} {}", "error:".red(), e)?,
                },
                "prefs" => {
                    let pairs: Vec<&str> = parts.collect();
                    match parse_assignments(&pairs) {
                        Ok(attributes) if attributes.is_empty() => {
                            writeln!(out, "{} /prefs KEY=VALUE...", "usage:".yellow())?
                        }
                        Ok(attributes) => match service.remember_preferences(user_id, attributes).await {
                            Ok(_) => writeln!(out, "{}", "Preferences saved".green())?,
                            Err(e) => writeln!(out, "{} {}", "error:".red(), e)?,
                        },
                        Err(e) => writeln!(out, "{} {}", "error:".red(), e)?,
                    }
                }
                other => writeln!(out, "{} unknown command '/{}'", "error:".red(), other)?,
            }
            continue;
        }

        let request = InvestigationRequest::new(line, user_id, session_id);
        match service.investigate(request).await {
            Ok(report) => writeln!(out, "{}", render_report(&report))?,
            Err(e) => writeln!(out, "{} {}", "error:".red(), e)?,
        }
    }
    Ok(())
}
