// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Investigation Aggregates
//!
//! Request-scoped value objects that flow through a single
//! [`Supervisor::handle`](crate::domain::supervisor::Supervisor::handle) call:
//!
//! | Type | Owner | Lifetime |
//! |------|-------|----------|
//! | [`InvestigationRequest`] | caller → Supervisor | one request, immutable |
//! | [`InvestigationPlan`] | Supervisor | one request, immutable, 1–5 steps |
//! | [`WorkerTask`] | Supervisor → Worker (copy) | one dispatch |
//! | [`WorkerResult`] | Worker → Supervisor | read-only after return |
//! | [`AggregatedReport`] | Supervisor → caller | terminal artifact |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::memory::Namespace;
use crate::domain::preferences::PreferenceProfile;

/// Upper bound on the number of domains a single plan may dispatch to.
pub const MAX_PLAN_STEPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvestigationId(pub Uuid);

impl InvestigationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvestigationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvestigationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A specialist area of investigation (e.g. `infra`, `logs`, `metrics`).
///
/// Always stored trimmed and lowercased so that configuration, planner output
/// and worker registration compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DomainName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationRequest {
    pub query: String,
    pub user_id: String,
    /// Empty when the caller does not track a conversation.
    #[serde(default)]
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl InvestigationRequest {
    pub fn new(
        query: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Reject malformed input before any work begins.
    ///
    /// The user id doubles as a memory namespace segment, so it must also be
    /// a valid segment (no `/`, no whitespace).
    pub fn validate(&self) -> Result<(), InvestigationError> {
        if self.query.trim().is_empty() {
            return Err(InvestigationError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }
        if self.user_id.trim().is_empty() {
            return Err(InvestigationError::InvalidRequest(
                "user_id must not be empty".to_string(),
            ));
        }
        if !Namespace::is_valid_segment(&self.user_id) {
            return Err(InvestigationError::InvalidRequest(format!(
                "user_id '{}' contains unsupported characters",
                self.user_id
            )));
        }
        if !self.session_id.is_empty() && !Namespace::is_valid_segment(&self.session_id) {
            return Err(InvestigationError::InvalidRequest(format!(
                "session_id '{}' contains unsupported characters",
                self.session_id
            )));
        }
        Ok(())
    }

    pub fn has_session(&self) -> bool {
        !self.session_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub domain: DomainName,
    pub rationale: String,
}

impl PlanStep {
    pub fn new(domain: impl Into<DomainName>, rationale: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            rationale: rationale.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("an investigation plan needs at least one step")]
    Empty,

    #[error("an investigation plan allows at most {MAX_PLAN_STEPS} steps, got {0}")]
    TooManySteps(usize),

    #[error("domain '{0}' appears more than once in the plan")]
    DuplicateDomain(DomainName),
}

/// Ordered, immutable list of domains to dispatch to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationPlan {
    steps: Vec<PlanStep>,
    /// Set when no domain matched and every configured domain was planned.
    broad: bool,
}

impl InvestigationPlan {
    pub fn new(steps: Vec<PlanStep>, broad: bool) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }
        if steps.len() > MAX_PLAN_STEPS {
            return Err(PlanError::TooManySteps(steps.len()));
        }
        for (idx, step) in steps.iter().enumerate() {
            if steps[..idx].iter().any(|s| s.domain == step.domain) {
                return Err(PlanError::DuplicateDomain(step.domain.clone()));
            }
        }
        Ok(Self { steps, broad })
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn domains(&self) -> Vec<DomainName> {
        self.steps.iter().map(|s| s.domain.clone()).collect()
    }

    pub fn is_broad(&self) -> bool {
        self.broad
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A unit of work handed to exactly one worker agent.
#[derive(Debug, Clone)]
pub struct WorkerTask {
    pub investigation_id: InvestigationId,
    pub domain: DomainName,
    pub query: String,
    pub context: HashMap<String, serde_json::Value>,
    pub deadline: tokio::time::Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolCallRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a worker could not deliver a complete finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerFailure {
    Timeout { after_ms: u64 },
    Cancelled,
    Failed { reason: String },
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { after_ms } => write!(f, "timed out after {}ms", after_ms),
            Self::Cancelled => f.write_str("cancelled at request deadline"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub domain: DomainName,
    pub findings: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub severity: Severity,
    /// The reasoning loop ran out of iterations before concluding.
    #[serde(default)]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkerFailure>,
}

impl WorkerResult {
    /// A result for a domain that produced nothing at all.
    pub fn failed(domain: DomainName, failure: WorkerFailure) -> Self {
        Self {
            domain,
            findings: Vec::new(),
            tool_calls: Vec::new(),
            severity: Severity::Info,
            truncated: false,
            error: Some(failure),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.truncated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationNotice {
    pub contact: String,
    pub severity: Severity,
    pub domains: Vec<DomainName>,
}

/// Structured, non-fatal annotation on a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportWarning {
    WorkerTimeout { domain: DomainName, after_ms: u64 },
    WorkerCancelled { domain: DomainName },
    WorkerFailed { domain: DomainName, reason: String },
    Truncated { domain: DomainName },
    AggregationIncomplete { domains: Vec<DomainName> },
    MemoryUnavailable { operation: String, reason: String },
}

impl fmt::Display for ReportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkerTimeout { domain, after_ms } => {
                write!(f, "WorkerTimeout: {} exceeded its {}ms deadline", domain, after_ms)
            }
            Self::WorkerCancelled { domain } => {
                write!(f, "WorkerTimeout: {} was cancelled at the request deadline", domain)
            }
            Self::WorkerFailed { domain, reason } => {
                write!(f, "WorkerFailed: {} ({})", domain, reason)
            }
            Self::Truncated { domain } => {
                write!(f, "Truncated: {} hit its iteration budget", domain)
            }
            Self::AggregationIncomplete { domains } => {
                let names: Vec<&str> = domains.iter().map(DomainName::as_str).collect();
                write!(f, "AggregationIncomplete: no findings from {}", names.join(", "))
            }
            Self::MemoryUnavailable { operation, reason } => {
                write!(f, "MemoryUnavailable: {} ({})", operation, reason)
            }
        }
    }
}

/// Terminal artifact of an investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub investigation_id: InvestigationId,
    pub query: String,
    pub user_id: String,
    pub plan: InvestigationPlan,
    pub findings_by_domain: BTreeMap<DomainName, WorkerResult>,
    pub narrative: String,
    pub profile: PreferenceProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationNotice>,
    pub warnings: Vec<ReportWarning>,
    pub completed_at: DateTime<Utc>,
}

impl AggregatedReport {
    /// Highest severity reported by any domain, `Info` when nothing was found.
    pub fn max_severity(&self) -> Severity {
        self.findings_by_domain
            .values()
            .map(|r| r.severity)
            .max()
            .unwrap_or(Severity::Info)
    }

    pub fn domains_with_findings(&self) -> Vec<DomainName> {
        self.findings_by_domain
            .values()
            .filter(|r| !r.findings.is_empty())
            .map(|r| r.domain.clone())
            .collect()
    }
}

/// Errors that abort a request. Everything else becomes a [`ReportWarning`].
#[derive(Debug, Error)]
pub enum InvestigationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Planning unavailable: {0}")]
    PlanningUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert!(InvestigationRequest::new("disk full", "alice", "s1").validate().is_ok());
        assert!(InvestigationRequest::new("disk full", "alice", "").validate().is_ok());

        let empty_query = InvestigationRequest::new("   ", "alice", "s1");
        assert!(matches!(
            empty_query.validate(),
            Err(InvestigationError::InvalidRequest(_))
        ));

        let empty_user = InvestigationRequest::new("disk full", "", "s1");
        assert!(matches!(
            empty_user.validate(),
            Err(InvestigationError::InvalidRequest(_))
        ));

        let slashed_user = InvestigationRequest::new("disk full", "alice/bob", "s1");
        assert!(slashed_user.validate().is_err());
    }

    #[test]
    fn test_plan_bounds() {
        assert_eq!(InvestigationPlan::new(vec![], false), Err(PlanError::Empty));

        let six: Vec<PlanStep> = (0..6)
            .map(|i| PlanStep::new(format!("d{}", i).as_str(), "r"))
            .collect();
        assert_eq!(
            InvestigationPlan::new(six, true),
            Err(PlanError::TooManySteps(6))
        );

        let dup = vec![PlanStep::new("logs", "a"), PlanStep::new("LOGS ", "b")];
        assert_eq!(
            InvestigationPlan::new(dup, false),
            Err(PlanError::DuplicateDomain(DomainName::new("logs")))
        );

        let plan = InvestigationPlan::new(
            vec![PlanStep::new("metrics", "a"), PlanStep::new("infra", "b")],
            false,
        )
        .unwrap();
        assert_eq!(plan.domains(), vec![DomainName::new("metrics"), DomainName::new("infra")]);
        assert!(!plan.is_broad());
    }

    #[test]
    fn test_severity_ordering_and_parsing() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Info < Severity::Low);
        assert_eq!(Severity::parse(" HIGH "), Some(Severity::High));
        assert_eq!(Severity::parse("sev1"), None);
    }

    #[test]
    fn test_warning_display_names_error_class() {
        let warning = ReportWarning::WorkerTimeout {
            domain: DomainName::new("infra"),
            after_ms: 30_000,
        };
        assert!(warning.to_string().starts_with("WorkerTimeout"));
    }
}
