// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Triage CLI

pub mod chat;
pub mod config;
pub mod investigate;

pub use self::chat::ChatArgs;
pub use self::config::ConfigCommand;
pub use self::investigate::InvestigateArgs;

use anyhow::Result;
use colored::{ColoredString, Colorize};
use std::collections::BTreeMap;

use triage_orchestrator_core::domain::events::InvestigationEvent;
use triage_orchestrator_core::domain::investigation::{AggregatedReport, Severity};

/// Parse `key=value` pairs, e.g. preference overrides.
pub fn parse_assignments<S: AsRef<str>>(pairs: &[S]) -> Result<BTreeMap<String, String>> {
    let mut attributes = BTreeMap::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got '{}'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Empty key in '{}'", pair);
        }
        attributes.insert(key.to_string(), value.trim().to_string());
    }
    Ok(attributes)
}

pub(crate) fn severity_label(severity: Severity) -> ColoredString {
    let label = severity.as_str();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.cyan(),
        Severity::Info => label.dimmed(),
    }
}

/// One-line progress description for `--follow` output.
pub fn describe_event(event: &InvestigationEvent) -> String {
    match event {
        InvestigationEvent::InvestigationStarted { query, .. } => format!("investigating: {}", query),
        InvestigationEvent::PlanCreated { domains, broad, .. } => {
            let names: Vec<&str> = domains.iter().map(|d| d.as_str()).collect();
            format!(
                "plan: {}{}",
                names.join(", "),
                if *broad { " (broad)" } else { "" }
            )
        }
        InvestigationEvent::DomainStarted { domain, .. } => format!("[{}] started", domain),
        InvestigationEvent::ToolInvoked {
            domain,
            tool_name,
            success,
            duration_ms,
            ..
        } => format!(
            "[{}] {} {} ({}ms)",
            domain,
            tool_name,
            if *success { "ok" } else { "failed" },
            duration_ms
        ),
        InvestigationEvent::DomainFinished {
            domain,
            severity,
            finding_count,
            error,
            ..
        } => match error {
            Some(error) => format!("[{}] finished with error: {}", domain, error),
            None => format!("[{}] finished: {} finding(s), {}", domain, finding_count, severity),
        },
        InvestigationEvent::AggregationStarted { result_count, .. } => {
            format!("aggregating {} result(s)", result_count)
        }
        InvestigationEvent::InvestigationCompleted {
            warning_count,
            escalated,
            ..
        } => format!(
            "completed with {} warning(s){}",
            warning_count,
            if *escalated { ", escalated" } else { "" }
        ),
    }
}

/// Human-readable report: the narrative plus a status footer.
pub fn render_report(report: &AggregatedReport) -> String {
    let mut out = report.narrative.trim_end().to_string();
    out.push_str("\n\n");
    out.push_str(&format!(
        "{} {} | severity {} | {} warning(s)",
        "Investigation".bold(),
        report.investigation_id,
        severity_label(report.max_severity()),
        report.warnings.len()
    ));
    if let Some(notice) = &report.escalation {
        out.push_str(&format!(
            "\n{} {}",
            "Escalate to".red().bold(),
            notice.contact
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_orchestrator_core::domain::investigation::{DomainName, InvestigationId};

    #[test]
    fn test_parse_assignments() {
        let attributes = parse_assignments(&["verbosity=brief", " format = text "]).unwrap();
        assert_eq!(attributes["verbosity"], "brief");
        assert_eq!(attributes["format"], "text");

        assert!(parse_assignments(&["verbosity"]).is_err());
        assert!(parse_assignments(&["=brief"]).is_err());
    }

    #[test]
    fn test_describe_event() {
        let investigation_id = InvestigationId::new();
        let plan = InvestigationEvent::PlanCreated {
            investigation_id,
            domains: vec![DomainName::new("infra"), DomainName::new("logs")],
            broad: true,
            created_at: Utc::now(),
        };
        assert_eq!(describe_event(&plan), "plan: infra, logs (broad)");

        let finished = InvestigationEvent::DomainFinished {
            investigation_id,
            domain: DomainName::new("metrics"),
            severity: Severity::High,
            finding_count: 2,
            error: None,
            finished_at: Utc::now(),
        };
        assert_eq!(describe_event(&finished), "[metrics] finished: 2 finding(s), high");
    }
}
