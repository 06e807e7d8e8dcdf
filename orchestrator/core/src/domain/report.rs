// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Report Aggregation
//!
//! Turns the worker results of one investigation into an
//! [`AggregatedReport`], personalised by the user's [`PreferenceProfile`].
//!
//! Aggregation is a pure function of its inputs: the same plan, results and
//! profile always render the same narrative, byte for byte. The narrative never
//! contains ids, timestamps or durations.
//!
//! Escalation is decided by an [`EscalationPolicy`]; the default is
//! [`SeverityThresholdPolicy`].

use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::domain::investigation::{
    AggregatedReport, DomainName, EscalationNotice, InvestigationId, InvestigationPlan,
    InvestigationRequest, ReportWarning, Severity, WorkerFailure, WorkerResult,
};
use crate::domain::memory::{HistoryRecord, KnowledgeRecord, Outcome};
use crate::domain::preferences::{PreferenceProfile, ReportFormat, Verbosity};

pub trait EscalationPolicy: Send + Sync {
    fn evaluate(
        &self,
        profile: &PreferenceProfile,
        results: &BTreeMap<DomainName, WorkerResult>,
    ) -> Option<EscalationNotice>;
}

/// Escalate when a contact is configured, the user opted in, and some domain
/// reached the profile's severity threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeverityThresholdPolicy;

impl EscalationPolicy for SeverityThresholdPolicy {
    fn evaluate(
        &self,
        profile: &PreferenceProfile,
        results: &BTreeMap<DomainName, WorkerResult>,
    ) -> Option<EscalationNotice> {
        if !profile.include_escalation {
            return None;
        }
        let contact = profile.escalation_contact.clone()?;
        let hot: Vec<&WorkerResult> = results
            .values()
            .filter(|r| r.severity >= profile.severity_threshold)
            .collect();
        let severity = hot.iter().map(|r| r.severity).max()?;
        Some(EscalationNotice {
            contact,
            severity,
            domains: hot.iter().map(|r| r.domain.clone()).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEscalate;

impl EscalationPolicy for NeverEscalate {
    fn evaluate(
        &self,
        _profile: &PreferenceProfile,
        _results: &BTreeMap<DomainName, WorkerResult>,
    ) -> Option<EscalationNotice> {
        None
    }
}

pub struct ReportAggregator {
    policy: Arc<dyn EscalationPolicy>,
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new(Arc::new(SeverityThresholdPolicy))
    }
}

impl ReportAggregator {
    pub fn new(policy: Arc<dyn EscalationPolicy>) -> Self {
        Self { policy }
    }

    /// Merge results into a report. `warnings` carries anything the caller
    /// already knows about (memory reads); worker warnings are appended in
    /// plan order.
    pub fn aggregate(
        &self,
        investigation_id: InvestigationId,
        request: &InvestigationRequest,
        plan: InvestigationPlan,
        results: Vec<WorkerResult>,
        profile: PreferenceProfile,
        mut warnings: Vec<ReportWarning>,
    ) -> AggregatedReport {
        let mut findings_by_domain: BTreeMap<DomainName, WorkerResult> = results
            .into_iter()
            .map(|r| (r.domain.clone(), r))
            .collect();

        // Every planned domain gets an entry, even if its result went missing.
        for domain in plan.domains() {
            findings_by_domain.entry(domain.clone()).or_insert_with(|| {
                WorkerResult::failed(
                    domain,
                    WorkerFailure::Failed {
                        reason: "no result returned".to_string(),
                    },
                )
            });
        }

        let mut empty_domains = Vec::new();
        for domain in plan.domains() {
            let Some(result) = findings_by_domain.get(&domain) else {
                continue;
            };
            match &result.error {
                Some(WorkerFailure::Timeout { after_ms }) => warnings.push(ReportWarning::WorkerTimeout {
                    domain: domain.clone(),
                    after_ms: *after_ms,
                }),
                Some(WorkerFailure::Cancelled) => warnings.push(ReportWarning::WorkerCancelled {
                    domain: domain.clone(),
                }),
                Some(WorkerFailure::Failed { reason }) => warnings.push(ReportWarning::WorkerFailed {
                    domain: domain.clone(),
                    reason: reason.clone(),
                }),
                None => {}
            }
            if result.truncated {
                warnings.push(ReportWarning::Truncated { domain: domain.clone() });
            }
            if result.findings.is_empty() {
                empty_domains.push(domain);
            }
        }
        if !empty_domains.is_empty() {
            warnings.push(ReportWarning::AggregationIncomplete { domains: empty_domains });
        }

        let escalation = self.policy.evaluate(&profile, &findings_by_domain);
        let narrative = render_narrative(
            &request.query,
            &plan,
            &findings_by_domain,
            &profile,
            escalation.as_ref(),
            &warnings,
        );

        AggregatedReport {
            investigation_id,
            query: request.query.clone(),
            user_id: request.user_id.clone(),
            plan,
            findings_by_domain,
            narrative,
            profile,
            escalation,
            warnings,
            completed_at: Utc::now(),
        }
    }
}

struct NarrativeWriter {
    format: ReportFormat,
    out: String,
}

impl NarrativeWriter {
    fn heading(&mut self, level: usize, text: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        match self.format {
            ReportFormat::Markdown => {
                let _ = writeln!(self.out, "{} {}", "#".repeat(level), text);
            }
            ReportFormat::Text if level == 1 => {
                let _ = writeln!(self.out, "{}\n{}", text, "=".repeat(text.chars().count()));
            }
            ReportFormat::Text => {
                let _ = writeln!(self.out, "{}:", text);
            }
        }
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{}", text);
    }

    fn bullet(&mut self, indent: usize, text: &str) {
        let marker = match self.format {
            ReportFormat::Markdown => "-",
            ReportFormat::Text => "*",
        };
        let _ = writeln!(self.out, "{}{} {}", "  ".repeat(indent), marker, text);
    }

    fn code(&self, text: &str) -> String {
        match self.format {
            ReportFormat::Markdown => format!("`{}`", text),
            ReportFormat::Text => text.to_string(),
        }
    }
}

fn status_label(result: &WorkerResult) -> String {
    match &result.error {
        Some(WorkerFailure::Timeout { .. }) => "timed out, partial".to_string(),
        Some(WorkerFailure::Cancelled) => "cancelled, partial".to_string(),
        Some(WorkerFailure::Failed { .. }) => "failed, partial".to_string(),
        None if result.truncated => "truncated".to_string(),
        None => format!("severity {}", result.severity),
    }
}

/// Deterministic, personalised summary of the results, in plan order.
pub fn render_narrative(
    query: &str,
    plan: &InvestigationPlan,
    results: &BTreeMap<DomainName, WorkerResult>,
    profile: &PreferenceProfile,
    escalation: Option<&EscalationNotice>,
    warnings: &[ReportWarning],
) -> String {
    let mut w = NarrativeWriter {
        format: profile.format,
        out: String::new(),
    };

    let ordered: Vec<&WorkerResult> = plan
        .domains()
        .iter()
        .filter_map(|d| results.get(d))
        .collect();
    let overall = ordered
        .iter()
        .map(|r| r.severity)
        .max()
        .unwrap_or(Severity::Info);
    let with_findings = ordered.iter().filter(|r| !r.findings.is_empty()).count();

    w.heading(1, &format!("Investigation: {}", query));
    let scope = if plan.is_broad() {
        format!("broad investigation across {} domains", plan.len())
    } else {
        let names: Vec<String> = plan.domains().iter().map(|d| d.to_string()).collect();
        names.join(", ")
    };
    w.line(&format!("Scope: {}", scope));
    w.line(&format!(
        "Overall severity: {} ({} of {} domains reported findings)",
        overall,
        with_findings,
        ordered.len()
    ));

    match profile.verbosity {
        Verbosity::Brief => {
            w.heading(2, "Summary");
            for result in &ordered {
                let headline = match result.findings.first() {
                    Some(first) if result.findings.len() > 1 => {
                        format!("{} (+{} more)", first, result.findings.len() - 1)
                    }
                    Some(first) => first.clone(),
                    None => "no findings".to_string(),
                };
                w.bullet(0, &format!("{} [{}]: {}", result.domain, status_label(result), headline));
            }
        }
        Verbosity::Standard | Verbosity::Detailed => {
            for result in &ordered {
                w.heading(2, &format!("{} ({})", result.domain, status_label(result)));
                if let Some(step) = plan.steps().iter().find(|s| s.domain == result.domain) {
                    w.line(&format!("Why: {}", step.rationale));
                }
                if result.findings.is_empty() {
                    w.line("No findings.");
                }
                for finding in &result.findings {
                    w.bullet(0, finding);
                }
                if profile.verbosity == Verbosity::Detailed && !result.tool_calls.is_empty() {
                    w.line("Tool calls:");
                    for call in &result.tool_calls {
                        let outcome = match &call.error {
                            Some(error) => format!("error: {}", error),
                            None => "ok".to_string(),
                        };
                        w.bullet(1, &format!("{} {}", w.code(&call.tool_name), outcome));
                    }
                }
            }
        }
    }

    if let Some(notice) = escalation {
        w.heading(2, "Escalation");
        let names: Vec<&str> = notice.domains.iter().map(DomainName::as_str).collect();
        w.line(&format!(
            "Severity {} reached in {}. Escalate to {}.",
            notice.severity,
            names.join(", "),
            notice.contact
        ));
    }

    if !warnings.is_empty() && profile.verbosity != Verbosity::Brief {
        w.heading(2, "Warnings");
        for warning in warnings {
            w.bullet(0, &warning.to_string());
        }
    }

    w.out
}

impl AggregatedReport {
    pub fn outcome(&self) -> Outcome {
        let results: Vec<&WorkerResult> = self.findings_by_domain.values().collect();
        if results.iter().all(|r| r.findings.is_empty()) {
            Outcome::Inconclusive
        } else if results.iter().all(|r| r.is_complete()) {
            Outcome::Complete
        } else {
            Outcome::Partial
        }
    }

    /// First finding of the most severe domain, ties going to plan order.
    pub fn root_cause(&self) -> Option<String> {
        let mut best: Option<&WorkerResult> = None;
        for domain in self.plan.domains() {
            let Some(result) = self.findings_by_domain.get(&domain) else {
                continue;
            };
            if result.findings.is_empty() {
                continue;
            }
            if best.map(|b| result.severity > b.severity).unwrap_or(true) {
                best = Some(result);
            }
        }
        best.and_then(|r| r.findings.first().cloned())
    }

    pub fn history_record(&self) -> HistoryRecord {
        let domains = self.plan.domains();
        let summary = format!(
            "{} of {} domains reported findings; overall severity {}",
            self.domains_with_findings().len(),
            domains.len(),
            self.max_severity()
        );
        HistoryRecord {
            investigation_id: self.investigation_id,
            query: self.query.clone(),
            domains,
            summary,
            root_cause: self.root_cause(),
            outcome: self.outcome(),
        }
    }

    /// One record per domain that produced findings.
    pub fn knowledge_records(&self) -> Vec<(DomainName, KnowledgeRecord)> {
        self.findings_by_domain
            .values()
            .filter(|r| !r.findings.is_empty())
            .map(|r| {
                let mut attributes = BTreeMap::new();
                attributes.insert("severity".to_string(), r.severity.to_string());
                attributes.insert("findings".to_string(), r.findings.join("\n"));
                attributes.insert("query".to_string(), self.query.clone());
                attributes.insert("investigation_id".to_string(), self.investigation_id.to_string());
                (
                    r.domain.clone(),
                    KnowledgeRecord {
                        scope_key: r.domain.to_string(),
                        attributes,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::investigation::PlanStep;

    fn plan() -> InvestigationPlan {
        InvestigationPlan::new(
            vec![
                PlanStep::new("metrics", "matched keywords: degraded"),
                PlanStep::new("infra", "planner: saturation"),
                PlanStep::new("logs", "planner: errors"),
            ],
            false,
        )
        .unwrap()
    }

    fn result(domain: &str, findings: &[&str], severity: Severity) -> WorkerResult {
        WorkerResult {
            domain: DomainName::new(domain),
            findings: findings.iter().map(|f| f.to_string()).collect(),
            tool_calls: vec![],
            severity,
            truncated: false,
            error: None,
        }
    }

    fn results() -> Vec<WorkerResult> {
        let mut infra = result("infra", &[], Severity::Info);
        infra.error = Some(WorkerFailure::Timeout { after_ms: 30_000 });
        vec![
            result("metrics", &["p99 latency tripled at 14:02"], Severity::High),
            infra,
            result("logs", &["connection pool exhausted"], Severity::Medium),
        ]
    }

    fn request() -> InvestigationRequest {
        InvestigationRequest::new("API response times degraded 3x", "alice", "s1")
    }

    #[test]
    fn test_partial_results_are_aggregated_with_warnings() {
        let report = ReportAggregator::default().aggregate(
            InvestigationId::new(),
            &request(),
            plan(),
            results(),
            PreferenceProfile::default(),
            vec![],
        );

        assert_eq!(report.findings_by_domain.len(), 3);
        assert!(report.narrative.contains("p99 latency tripled"));
        assert!(report.narrative.contains("connection pool exhausted"));
        assert!(report.warnings.contains(&ReportWarning::WorkerTimeout {
            domain: DomainName::new("infra"),
            after_ms: 30_000,
        }));
        assert!(report.warnings.contains(&ReportWarning::AggregationIncomplete {
            domains: vec![DomainName::new("infra")],
        }));
        assert_eq!(report.outcome(), Outcome::Partial);
        assert_eq!(report.root_cause().as_deref(), Some("p99 latency tripled at 14:02"));
    }

    #[test]
    fn test_narrative_is_deterministic() {
        let aggregator = ReportAggregator::default();
        let a = aggregator.aggregate(
            InvestigationId::new(),
            &request(),
            plan(),
            results(),
            PreferenceProfile::default(),
            vec![],
        );
        let mut reversed = results();
        reversed.reverse();
        let b = aggregator.aggregate(
            InvestigationId::new(),
            &request(),
            plan(),
            reversed,
            PreferenceProfile::default(),
            vec![],
        );
        assert_eq!(a.narrative, b.narrative);
    }

    #[test]
    fn test_verbosity_and_format_change_rendering() {
        let aggregator = ReportAggregator::default();
        let brief_text = PreferenceProfile {
            verbosity: Verbosity::Brief,
            format: ReportFormat::Text,
            ..Default::default()
        };
        let report = aggregator.aggregate(InvestigationId::new(), &request(), plan(), results(), brief_text, vec![]);
        assert!(!report.narrative.contains('#'));
        assert!(report.narrative.contains("metrics [severity high]: p99 latency tripled at 14:02"));
        assert!(!report.narrative.contains("Warnings"));

        let markdown = aggregator.aggregate(
            InvestigationId::new(),
            &request(),
            plan(),
            results(),
            PreferenceProfile::default(),
            vec![],
        );
        assert!(markdown.narrative.starts_with("# Investigation: API response times degraded 3x"));
        assert!(markdown.narrative.contains("## Warnings"));
    }

    #[test]
    fn test_escalation_policy() {
        let mut profile = PreferenceProfile {
            escalation_contact: Some("#sre-oncall".to_string()),
            ..Default::default()
        };
        let aggregator = ReportAggregator::default();

        let report = aggregator.aggregate(InvestigationId::new(), &request(), plan(), results(), profile.clone(), vec![]);
        let notice = report.escalation.clone().unwrap();
        assert_eq!(notice.severity, Severity::High);
        assert_eq!(notice.domains, vec![DomainName::new("metrics")]);
        assert!(report.narrative.contains("Escalate to #sre-oncall"));

        profile.severity_threshold = Severity::Critical;
        let report = aggregator.aggregate(InvestigationId::new(), &request(), plan(), results(), profile.clone(), vec![]);
        assert!(report.escalation.is_none());

        profile.severity_threshold = Severity::Low;
        profile.include_escalation = false;
        let report = aggregator.aggregate(InvestigationId::new(), &request(), plan(), results(), profile.clone(), vec![]);
        assert!(report.escalation.is_none());

        profile.include_escalation = true;
        let report = ReportAggregator::new(Arc::new(NeverEscalate))
            .aggregate(InvestigationId::new(), &request(), plan(), results(), profile, vec![]);
        assert!(report.escalation.is_none());
    }

    #[test]
    fn test_history_and_knowledge_derivation() {
        let report = ReportAggregator::default().aggregate(
            InvestigationId::new(),
            &request(),
            plan(),
            results(),
            PreferenceProfile::default(),
            vec![],
        );
        let history = report.history_record();
        assert_eq!(history.query, "API response times degraded 3x");
        assert_eq!(history.domains.len(), 3);
        assert_eq!(history.outcome, Outcome::Partial);
        assert!(history.summary.starts_with("2 of 3 domains"));

        let knowledge = report.knowledge_records();
        let domains: Vec<&str> = knowledge.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(domains, vec!["logs", "metrics"]);
        assert_eq!(knowledge[1].1.attributes["severity"], "high");
    }

    #[test]
    fn test_missing_result_is_filled_in() {
        let report = ReportAggregator::default().aggregate(
            InvestigationId::new(),
            &request(),
            plan(),
            vec![result("metrics", &["x"], Severity::Low)],
            PreferenceProfile::default(),
            vec![],
        );
        assert_eq!(report.findings_by_domain.len(), 3);
        assert_eq!(report.outcome(), Outcome::Partial);
    }
}
