// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Investigation Supervisor
//!
//! Sole orchestrator of an investigation and the only component that touches
//! long-lived memory.
//!
//! ## Request Lifecycle
//! | Phase | Span | Failure handling |
//! |-------|------|------------------|
//! | validate | – | `InvalidRequest`, fatal |
//! | load session, preferences, history | – | logged, defaults, `MemoryUnavailable` warning |
//! | plan (keywords + planner) | `investigation.plan` | unreachable planner is fatal (`PlanningUnavailable`) |
//! | record user turn | – | logged, `MemoryUnavailable` warning |
//! | dispatch workers concurrently | `investigation.dispatch` | per-worker failures become partial results |
//! | aggregate + personalise | `investigation.aggregate` | never fails |
//! | persist history + knowledge | `investigation.persist` | one retry, then `MemoryUnavailable` warning |
//!
//! ## Deadlines
//! Each worker gets `task_timeout` from dispatch. The request deadline
//! (`request_timeout` from the start of [`Supervisor::handle`]) cancels every
//! worker still running; after `cancellation_grace` anything left is aborted
//! and reported as cancelled. A worker that panics is reported as failed.
//! The fan-in never waits past `request_timeout + cancellation_grace`.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::domain::events::{InvestigationEvent, InvestigationObserver, NoopObserver};
use crate::domain::investigation::{
    AggregatedReport, DomainName, InvestigationError, InvestigationId, InvestigationPlan,
    InvestigationRequest, ReportWarning, WorkerFailure, WorkerResult, WorkerTask,
};
use crate::domain::llm::{PlanningContext, PlanningModel};
use crate::domain::memory::{
    MemoryError, MemoryRecord, MemoryStore, Namespace, PreferenceRecord, RecordId, StoredRecord,
};
use crate::domain::preferences::PreferenceProfile;
use crate::domain::report::{EscalationPolicy, ReportAggregator};
use crate::domain::routing::{KeywordRouter, RouteMatch};
use crate::domain::session::{Message, Role, SessionError, SessionStore};
use crate::domain::telemetry::{
    NoopSpanExporter, SpanExporter, SpanRecord, SpanStatus, SPAN_AGGREGATE, SPAN_DISPATCH,
    SPAN_INVESTIGATION, SPAN_PERSIST, SPAN_PLAN,
};
use crate::domain::worker::{WorkerAgent, WorkerError};

/// Session messages shown to the planner.
const RECENT_TURNS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub task_timeout: Duration,
    pub request_timeout: Duration,
    pub cancellation_grace: Duration,
    pub memory_query_limit: usize,
    pub memory_write_retry_delay: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            cancellation_grace: Duration::from_secs(2),
            memory_query_limit: 5,
            memory_write_retry_delay: Duration::from_millis(250),
        }
    }
}

/// Wall-clock start plus monotonic timer for a span.
struct SpanTimer {
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl SpanTimer {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }
}

fn memory_warning(operation: &str, reason: impl ToString) -> ReportWarning {
    ReportWarning::MemoryUnavailable {
        operation: operation.to_string(),
        reason: reason.to_string(),
    }
}

pub struct Supervisor {
    router: KeywordRouter,
    planner: Arc<dyn PlanningModel>,
    workers: BTreeMap<DomainName, Arc<WorkerAgent>>,
    memory: Arc<dyn MemoryStore>,
    sessions: Arc<dyn SessionStore>,
    aggregator: ReportAggregator,
    observer: Arc<dyn InvestigationObserver>,
    spans: Arc<dyn SpanExporter>,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(
        router: KeywordRouter,
        planner: Arc<dyn PlanningModel>,
        workers: Vec<Arc<WorkerAgent>>,
        memory: Arc<dyn MemoryStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            router,
            planner,
            workers: workers
                .into_iter()
                .map(|w| (w.domain().clone(), w))
                .collect(),
            memory,
            sessions,
            aggregator: ReportAggregator::default(),
            observer: Arc::new(NoopObserver),
            spans: Arc::new(NoopSpanExporter),
            settings: SupervisorSettings::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn InvestigationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_span_exporter(mut self, spans: Arc<dyn SpanExporter>) -> Self {
        self.spans = spans;
        self
    }

    pub fn with_escalation_policy(mut self, policy: Arc<dyn EscalationPolicy>) -> Self {
        self.aggregator = ReportAggregator::new(policy);
        self
    }

    pub fn with_settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn domains(&self) -> Vec<DomainName> {
        self.workers.keys().cloned().collect()
    }

    /// Run one investigation end to end.
    pub async fn handle(
        &self,
        request: InvestigationRequest,
    ) -> Result<AggregatedReport, InvestigationError> {
        request.validate()?;
        let investigation_id = InvestigationId::new();
        let span = info_span!(
            "investigation",
            investigation_id = %investigation_id,
            user_id = %request.user_id,
        );
        self.run(investigation_id, request).instrument(span).await
    }

    /// Store a new preference record for `user_id`. The latest record wins.
    pub async fn remember_preferences(
        &self,
        user_id: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<RecordId, MemoryError> {
        let namespace = Namespace::preferences(user_id)?;
        let record = MemoryRecord::Preference(PreferenceRecord {
            user_id: user_id.to_string(),
            attributes,
        });
        let id = self.memory.put(&namespace.to_string(), record).await?;
        info!(user_id, "Stored preference record");
        Ok(id)
    }

    pub async fn conversation(&self, session_id: &str) -> Result<Vec<Message>, SessionError> {
        self.sessions.load(session_id).await
    }

    async fn run(
        &self,
        investigation_id: InvestigationId,
        request: InvestigationRequest,
    ) -> Result<AggregatedReport, InvestigationError> {
        let root = SpanTimer::start();
        let request_deadline = root.clock + self.settings.request_timeout;
        let mut warnings: Vec<ReportWarning> = Vec::new();

        info!(query = %request.query, "Investigation started");
        self.observer.on_event(InvestigationEvent::InvestigationStarted {
            investigation_id,
            user_id: request.user_id.clone(),
            query: request.query.clone(),
            started_at: root.started_at,
        });

        let session = self.load_session(&request, &mut warnings).await;
        let profile = self.load_profile(&request.user_id, &mut warnings).await;
        let matches = self.router.classify(&request.query);
        let memories = self.load_context(&request, &matches, &mut warnings).await;

        let plan = match self
            .plan(investigation_id, &request, &matches, &memories, &session)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                self.finish_span(
                    SpanRecord::new(
                        SPAN_INVESTIGATION,
                        investigation_id,
                        root.started_at,
                        root.clock.elapsed(),
                    )
                    .with_status(SpanStatus::Error)
                    .with_attribute("error", &e),
                );
                return Err(e);
            }
        };
        self.record_user_turn(&request, &mut warnings).await;

        let results = self
            .dispatch(investigation_id, &request, &plan, &memories, request_deadline)
            .await;

        let aggregate = SpanTimer::start();
        self.observer.on_event(InvestigationEvent::AggregationStarted {
            investigation_id,
            result_count: results.len(),
            started_at: aggregate.started_at,
        });
        let mut report = self.aggregator.aggregate(
            investigation_id,
            &request,
            plan,
            results,
            profile,
            warnings,
        );
        self.finish_span(
            SpanRecord::new(
                SPAN_AGGREGATE,
                investigation_id,
                aggregate.started_at,
                aggregate.clock.elapsed(),
            )
            .with_attribute("warnings", report.warnings.len())
            .with_attribute("escalated", report.escalation.is_some()),
        );

        if request.has_session() {
            if let Err(e) = self
                .sessions
                .append(&request.session_id, Message::assistant(report.narrative.clone()))
                .await
            {
                warn!(error = %e, "Failed to append assistant turn to session");
                report.warnings.push(memory_warning("session append", e));
            }
        }

        self.persist(investigation_id, &request, &mut report).await;

        info!(
            domains = report.findings_by_domain.len(),
            warnings = report.warnings.len(),
            severity = %report.max_severity(),
            "Investigation completed"
        );
        self.observer.on_event(InvestigationEvent::InvestigationCompleted {
            investigation_id,
            warning_count: report.warnings.len(),
            escalated: report.escalation.is_some(),
            completed_at: Utc::now(),
        });
        self.finish_span(
            SpanRecord::new(
                SPAN_INVESTIGATION,
                investigation_id,
                root.started_at,
                root.clock.elapsed(),
            )
            .with_attribute("domains", report.plan.len())
            .with_attribute("outcome", report.outcome()),
        );

        Ok(report)
    }

    fn finish_span(&self, span: SpanRecord) {
        self.spans.record_span(span);
    }

    /// Load the conversation so far.
    async fn load_session(
        &self,
        request: &InvestigationRequest,
        warnings: &mut Vec<ReportWarning>,
    ) -> Vec<Message> {
        if !request.has_session() {
            return Vec::new();
        }
        match self.sessions.load(&request.session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session_id = %request.session_id, error = %e, "Session load failed, continuing without history");
                warnings.push(memory_warning("session load", e));
                Vec::new()
            }
        }
    }

    /// Record the user turn. Only called once a plan exists, so a failed
    /// request never leaves an unanswered turn behind.
    async fn record_user_turn(&self, request: &InvestigationRequest, warnings: &mut Vec<ReportWarning>) {
        if !request.has_session() {
            return;
        }
        if let Err(e) = self
            .sessions
            .append(&request.session_id, Message::user(request.query.clone()))
            .await
        {
            warn!(session_id = %request.session_id, error = %e, "Failed to append user turn to session");
            warnings.push(memory_warning("session append", e));
        }
    }

    async fn load_profile(&self, user_id: &str, warnings: &mut Vec<ReportWarning>) -> PreferenceProfile {
        let namespace = match Namespace::preferences(user_id) {
            Ok(ns) => ns,
            Err(e) => {
                warnings.push(memory_warning("preference query", e));
                return PreferenceProfile::default();
            }
        };
        match self.memory.query(&namespace.to_string(), "", 1).await {
            Ok(records) => records
                .into_iter()
                .find_map(|stored| match stored.record {
                    MemoryRecord::Preference(p) => Some(PreferenceProfile::from_attributes(&p.attributes)),
                    _ => None,
                })
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Preference lookup failed, using default profile");
                warnings.push(memory_warning("preference query", e));
                PreferenceProfile::default()
            }
        }
    }

    /// Up to `memory_query_limit` history and knowledge records relevant to the
    /// keyword-detected domains (every configured domain when none matched),
    /// most recent first.
    async fn load_context(
        &self,
        request: &InvestigationRequest,
        matches: &[RouteMatch],
        warnings: &mut Vec<ReportWarning>,
    ) -> Vec<StoredRecord> {
        let limit = self.settings.memory_query_limit;
        let scope: Vec<DomainName> = if matches.is_empty() {
            self.router.routes().iter().map(|r| r.domain.clone()).collect()
        } else {
            matches.iter().map(|m| m.domain.clone()).collect()
        };

        let mut namespaces = Vec::new();
        match Namespace::history(&request.user_id, None) {
            Ok(ns) => namespaces.push(("history query", ns)),
            Err(e) => warnings.push(memory_warning("history query", e)),
        }
        for domain in &scope {
            match Namespace::knowledge(domain, &request.user_id) {
                Ok(ns) => namespaces.push(("knowledge query", ns)),
                Err(e) => warnings.push(memory_warning("knowledge query", e)),
            }
        }

        let mut records: Vec<StoredRecord> = Vec::new();
        for (operation, namespace) in namespaces {
            match self.memory.query(&namespace.to_string(), &request.query, limit).await {
                Ok(found) => records.extend(found.into_iter().filter(|stored| match &stored.record {
                    MemoryRecord::History(h) => {
                        h.domains.is_empty() || h.domains.iter().any(|d| scope.contains(d))
                    }
                    _ => true,
                })),
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Memory query failed, continuing without it");
                    warnings.push(memory_warning(operation, e));
                }
            }
        }

        records.sort_by(|a, b| b.written_at.cmp(&a.written_at));
        records.truncate(limit);
        debug!(count = records.len(), "Loaded memory context");
        records
    }

    async fn plan(
        &self,
        investigation_id: InvestigationId,
        request: &InvestigationRequest,
        matches: &[RouteMatch],
        memories: &[StoredRecord],
        session: &[Message],
    ) -> Result<InvestigationPlan, InvestigationError> {
        let timer = SpanTimer::start();
        let context = PlanningContext {
            keyword_domains: matches.iter().map(|m| m.domain.clone()).collect(),
            memories: memories.iter().map(memory_summary).collect(),
            session_turns: session.len(),
            recent_turns: session
                .iter()
                .skip(session.len().saturating_sub(RECENT_TURNS))
                .map(|m| format!("{}: {}", role_label(m.role), m.content))
                .collect(),
        };

        let proposed = match self
            .planner
            .propose(request, &self.router.candidates(), &context)
            .await
        {
            Ok(steps) => steps,
            Err(e) if e.is_unavailable() => {
                warn!(error = %e, "Planning collaborator unavailable");
                self.finish_span(
                    SpanRecord::new(SPAN_PLAN, investigation_id, timer.started_at, timer.clock.elapsed())
                        .with_status(SpanStatus::Error)
                        .with_attribute("error", &e),
                );
                return Err(InvestigationError::PlanningUnavailable(e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "Planner reply unusable, planning from keywords only");
                Vec::new()
            }
        };

        let plan = self.router.build_plan(matches, proposed).map_err(|e| {
            InvestigationError::PlanningUnavailable(format!("no plan could be built: {}", e))
        })?;

        info!(
            domains = ?plan.domains().iter().map(DomainName::as_str).collect::<Vec<_>>(),
            broad = plan.is_broad(),
            "Investigation plan created"
        );
        self.observer.on_event(InvestigationEvent::PlanCreated {
            investigation_id,
            domains: plan.domains(),
            broad: plan.is_broad(),
            created_at: Utc::now(),
        });
        self.finish_span(
            SpanRecord::new(SPAN_PLAN, investigation_id, timer.started_at, timer.clock.elapsed())
                .with_attribute("steps", plan.len())
                .with_attribute("broad", plan.is_broad())
                .with_attribute("keyword_matches", matches.len()),
        );
        Ok(plan)
    }

    fn task_context(
        &self,
        request: &InvestigationRequest,
        domain: &DomainName,
        memories: &[StoredRecord],
    ) -> HashMap<String, Value> {
        let related: Vec<String> = memories
            .iter()
            .filter(|stored| match &stored.record {
                MemoryRecord::Knowledge(k) => k.scope_key == domain.as_str(),
                MemoryRecord::History(h) => h.domains.contains(domain),
                MemoryRecord::Preference(_) => false,
            })
            .map(memory_summary)
            .collect();

        let mut context = HashMap::new();
        context.insert("user_id".to_string(), json!(request.user_id));
        if !related.is_empty() {
            context.insert("prior_knowledge".to_string(), json!(related));
        }
        context
    }

    async fn dispatch(
        &self,
        investigation_id: InvestigationId,
        request: &InvestigationRequest,
        plan: &InvestigationPlan,
        memories: &[StoredRecord],
        request_deadline: Instant,
    ) -> Vec<WorkerResult> {
        let timer = SpanTimer::start();
        let grace = self.settings.cancellation_grace;
        let cancel = CancellationToken::new();
        let mut set: JoinSet<(DomainName, Result<Result<WorkerResult, WorkerError>, tokio::time::error::Elapsed>)> =
            JoinSet::new();
        let mut pending: BTreeSet<DomainName> = BTreeSet::new();
        let mut task_domains: HashMap<tokio::task::Id, DomainName> = HashMap::new();
        let mut results: Vec<WorkerResult> = Vec::new();

        for step in plan.steps() {
            let domain = step.domain.clone();
            let Some(worker) = self.workers.get(&domain).cloned() else {
                warn!(domain = %domain, "No worker registered for planned domain");
                results.push(WorkerResult::failed(
                    domain,
                    WorkerFailure::Failed {
                        reason: "no worker registered for domain".to_string(),
                    },
                ));
                continue;
            };

            let task = WorkerTask {
                investigation_id,
                domain: domain.clone(),
                query: request.query.clone(),
                context: self.task_context(request, &domain, memories),
                deadline: Instant::now() + self.settings.task_timeout,
            };
            let backstop = task.deadline + grace;
            let token = cancel.child_token();

            self.observer.on_event(InvestigationEvent::DomainStarted {
                investigation_id,
                domain: domain.clone(),
                started_at: Utc::now(),
            });
            pending.insert(domain.clone());

            let span = info_span!("worker", domain = %domain);
            let tracked = domain.clone();
            let handle = set.spawn(
                async move {
                    let outcome = tokio::time::timeout_at(
                        backstop,
                        worker.execute_with_cancellation(task, token),
                    )
                    .await;
                    (domain, outcome)
                }
                .instrument(span),
            );
            task_domains.insert(handle.id(), tracked);
        }

        let request_timer = tokio::time::sleep_until(request_deadline);
        let abort_timer = tokio::time::sleep_until(request_deadline + grace);
        tokio::pin!(request_timer);
        tokio::pin!(abort_timer);
        let mut aborted = false;

        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((domain, outcome))) => {
                        pending.remove(&domain);
                        let result = self.settle(domain, outcome);
                        self.publish_finished(investigation_id, &result);
                        results.push(result);
                    }
                    Some(Err(e)) => {
                        let failure = if e.is_cancelled() {
                            debug!("Worker task aborted after cancellation grace");
                            WorkerFailure::Cancelled
                        } else {
                            warn!(error = %e, "Worker task panicked");
                            WorkerFailure::Failed {
                                reason: "worker task panicked".to_string(),
                            }
                        };
                        if let Some(domain) = task_domains.remove(&e.id()) {
                            pending.remove(&domain);
                            let result = WorkerResult::failed(domain, failure);
                            self.publish_finished(investigation_id, &result);
                            results.push(result);
                        }
                    }
                },
                _ = &mut request_timer, if !cancel.is_cancelled() => {
                    warn!(pending = pending.len(), "Request deadline reached, cancelling running workers");
                    cancel.cancel();
                }
                _ = &mut abort_timer, if cancel.is_cancelled() && !aborted => {
                    warn!(pending = pending.len(), "Cancellation grace elapsed, aborting workers");
                    set.abort_all();
                    aborted = true;
                }
            }
        }

        let failed = results.iter().filter(|r| r.error.is_some()).count();
        self.finish_span(
            SpanRecord::new(SPAN_DISPATCH, investigation_id, timer.started_at, timer.clock.elapsed())
                .with_status(if failed == 0 { SpanStatus::Ok } else { SpanStatus::Error })
                .with_attribute("workers", results.len())
                .with_attribute("failed", failed)
                .with_attribute("cancelled", cancel.is_cancelled()),
        );
        results
    }

    fn settle(
        &self,
        domain: DomainName,
        outcome: Result<Result<WorkerResult, WorkerError>, tokio::time::error::Elapsed>,
    ) -> WorkerResult {
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(domain = %domain, error = %e, "Worker rejected task");
                WorkerResult::failed(domain, WorkerFailure::Failed { reason: e.to_string() })
            }
            Err(_) => {
                let after_ms = (self.settings.task_timeout + self.settings.cancellation_grace).as_millis() as u64;
                warn!(domain = %domain, after_ms, "Worker ignored its deadline and was stopped");
                WorkerResult::failed(domain, WorkerFailure::Timeout { after_ms })
            }
        }
    }

    fn publish_finished(&self, investigation_id: InvestigationId, result: &WorkerResult) {
        info!(
            domain = %result.domain,
            findings = result.findings.len(),
            tool_calls = result.tool_calls.len(),
            error = ?result.error,
            "Domain finished"
        );
        self.observer.on_event(InvestigationEvent::DomainFinished {
            investigation_id,
            domain: result.domain.clone(),
            severity: result.severity,
            finding_count: result.findings.len(),
            error: result.error.as_ref().map(|e| e.to_string()),
            finished_at: Utc::now(),
        });
    }

    async fn persist(
        &self,
        investigation_id: InvestigationId,
        request: &InvestigationRequest,
        report: &mut AggregatedReport,
    ) {
        let timer = SpanTimer::start();
        let mut writes: Vec<(&'static str, Result<Namespace, MemoryError>, MemoryRecord)> = Vec::new();

        let session = request.has_session().then_some(request.session_id.as_str());
        writes.push((
            "history write",
            Namespace::history(&request.user_id, session),
            MemoryRecord::History(report.history_record()),
        ));
        for (domain, record) in report.knowledge_records() {
            writes.push((
                "knowledge write",
                Namespace::knowledge(&domain, &request.user_id),
                MemoryRecord::Knowledge(record),
            ));
        }

        let attempted = writes.len();
        let mut failed = 0;
        for (operation, namespace, record) in writes {
            let outcome = match namespace {
                Ok(ns) => self.put_with_retry(&ns.to_string(), record).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                failed += 1;
                report.warnings.push(memory_warning(operation, e));
            }
        }

        self.finish_span(
            SpanRecord::new(SPAN_PERSIST, investigation_id, timer.started_at, timer.clock.elapsed())
                .with_status(if failed == 0 { SpanStatus::Ok } else { SpanStatus::Error })
                .with_attribute("records", attempted)
                .with_attribute("failed", failed),
        );
    }

    /// Append with a single retry after `memory_write_retry_delay`.
    async fn put_with_retry(&self, namespace: &str, record: MemoryRecord) -> Result<RecordId, MemoryError> {
        match self.memory.put(namespace, record.clone()).await {
            Ok(id) => Ok(id),
            Err(e @ MemoryError::InvalidNamespace(_)) => {
                warn!(namespace, error = %e, "Memory write rejected");
                Err(e)
            }
            Err(first) => {
                warn!(namespace, error = %first, "Memory write failed, retrying once");
                tokio::time::sleep(self.settings.memory_write_retry_delay).await;
                self.memory.put(namespace, record).await.map_err(|e| {
                    warn!(namespace, error = %e, "Memory write retry failed");
                    e
                })
            }
        }
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn memory_summary(stored: &StoredRecord) -> String {
    match &stored.record {
        MemoryRecord::History(h) => {
            let mut summary = format!("past investigation '{}' ({}): {}", h.query, h.outcome, h.summary);
            if let Some(cause) = &h.root_cause {
                summary.push_str(&format!("; likely cause: {}", cause));
            }
            summary
        }
        MemoryRecord::Knowledge(k) => {
            let severity = k.attributes.get("severity").map(String::as_str).unwrap_or("unknown");
            let findings = k.attributes.get("findings").map(String::as_str).unwrap_or("");
            format!("{} knowledge (severity {}): {}", k.scope_key, severity, findings.replace('\n', "; "))
        }
        MemoryRecord::Preference(p) => format!("preferences for {}", p.user_id),
    }
}
