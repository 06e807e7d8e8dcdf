// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Agent
//!
//! One specialist per domain. Runs a bounded reasoning loop over the tools in
//! its [`ToolScope`] and returns a [`WorkerResult`].
//!
//! ## Loop
//! ```text
//! Reasoning ──final──────────────▶ Concluded
//!     │  ▲
//! tool│  │
//!     ▼  │
//! ToolCall ─▶ Observation
//!
//! Reasoning with iterations == max ─▶ Exhausted   (truncated = true)
//! deadline / cancel / model error  ─▶ Failed      (error = Some(..))
//! ```
//!
//! Every terminal state returns `Ok` with whatever was gathered. Tool errors
//! are observations, never worker failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::events::{InvestigationEvent, InvestigationObserver, NoopObserver};
use crate::domain::investigation::{
    DomainName, Severity, ToolCallRecord, WorkerFailure, WorkerResult, WorkerTask,
};
use crate::domain::llm::{Decision, FinalAnswer, ModelInference, ToolCallRequest};
use crate::domain::tools::{ToolError, ToolGateway, ToolScope};

/// Maximum characters kept per partial finding.
pub const PARTIAL_FINDING_LIMIT: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub max_iterations: u32,
    pub tool_call_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            tool_call_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker for domain '{expected}' received a task for '{actual}'")]
    DomainMismatch {
        expected: DomainName,
        actual: DomainName,
    },
}

enum LoopState {
    Reasoning,
    ToolCall(ToolCallRequest),
    Observation(ToolCallRecord),
    Concluded(FinalAnswer),
    Exhausted,
    Failed(WorkerFailure),
}

enum Bounded<T> {
    Done(T),
    DeadlineReached,
    Cancelled,
}

async fn bounded<F: Future>(
    cancel: &CancellationToken,
    deadline: Instant,
    fut: F,
) -> Bounded<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        _ = tokio::time::sleep_until(deadline) => Bounded::DeadlineReached,
        out = fut => Bounded::Done(out),
    }
}

pub struct WorkerAgent {
    domain: DomainName,
    scope: ToolScope,
    inference: Arc<dyn ModelInference>,
    gateway: Arc<dyn ToolGateway>,
    observer: Arc<dyn InvestigationObserver>,
    settings: WorkerSettings,
}

impl WorkerAgent {
    pub fn new(
        domain: DomainName,
        scope: ToolScope,
        inference: Arc<dyn ModelInference>,
        gateway: Arc<dyn ToolGateway>,
    ) -> Self {
        Self {
            domain,
            scope,
            inference,
            gateway,
            observer: Arc::new(NoopObserver),
            settings: WorkerSettings::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn InvestigationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn domain(&self) -> &DomainName {
        &self.domain
    }

    pub fn scope(&self) -> &ToolScope {
        &self.scope
    }

    pub async fn execute(&self, task: WorkerTask) -> Result<WorkerResult, WorkerError> {
        self.execute_with_cancellation(task, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but also stops when `cancel` fires.
    pub async fn execute_with_cancellation(
        &self,
        task: WorkerTask,
        cancel: CancellationToken,
    ) -> Result<WorkerResult, WorkerError> {
        if task.domain != self.domain {
            return Err(WorkerError::DomainMismatch {
                expected: self.domain.clone(),
                actual: task.domain,
            });
        }

        let started = Instant::now();
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut iterations: u32 = 0;
        let mut state = LoopState::Reasoning;

        loop {
            state = match state {
                LoopState::Reasoning => {
                    if iterations >= self.settings.max_iterations {
                        LoopState::Exhausted
                    } else {
                        iterations += 1;
                        let prompt = self.render_prompt(&task, &tool_calls, iterations);
                        debug!(domain = %self.domain, iteration = iterations, "Reasoning step");
                        match bounded(
                            &cancel,
                            task.deadline,
                            self.inference.complete(&prompt, &self.scope.tools),
                        )
                        .await
                        {
                            Bounded::Done(Ok(Decision::Final(answer))) => LoopState::Concluded(answer),
                            Bounded::Done(Ok(Decision::ToolCall(request))) => LoopState::ToolCall(request),
                            Bounded::Done(Err(e)) => {
                                warn!(domain = %self.domain, error = %e, "Model inference failed");
                                LoopState::Failed(WorkerFailure::Failed {
                                    reason: format!("model inference failed: {}", e),
                                })
                            }
                            Bounded::DeadlineReached => LoopState::Failed(WorkerFailure::Timeout {
                                after_ms: started.elapsed().as_millis() as u64,
                            }),
                            Bounded::Cancelled => LoopState::Failed(WorkerFailure::Cancelled),
                        }
                    }
                }
                LoopState::ToolCall(request) => {
                    match self.call_tool(&task, request, &cancel, started).await {
                        Ok(record) => LoopState::Observation(record),
                        Err((record, failure)) => {
                            self.publish_tool_event(&task, &record);
                            tool_calls.push(record);
                            LoopState::Failed(failure)
                        }
                    }
                }
                LoopState::Observation(record) => {
                    self.publish_tool_event(&task, &record);
                    tool_calls.push(record);
                    LoopState::Reasoning
                }
                LoopState::Concluded(answer) => {
                    info!(
                        domain = %self.domain,
                        iterations,
                        tool_calls = tool_calls.len(),
                        severity = %answer.severity,
                        "Worker concluded"
                    );
                    return Ok(WorkerResult {
                        domain: self.domain.clone(),
                        findings: answer.findings,
                        tool_calls,
                        severity: answer.severity,
                        truncated: false,
                        error: None,
                    });
                }
                LoopState::Exhausted => {
                    warn!(
                        domain = %self.domain,
                        max_iterations = self.settings.max_iterations,
                        "Iteration budget exhausted, returning partial findings"
                    );
                    return Ok(WorkerResult {
                        domain: self.domain.clone(),
                        findings: partial_findings(&tool_calls),
                        tool_calls,
                        severity: Severity::Info,
                        truncated: true,
                        error: None,
                    });
                }
                LoopState::Failed(failure) => {
                    warn!(domain = %self.domain, failure = %failure, "Worker stopped early");
                    return Ok(WorkerResult {
                        domain: self.domain.clone(),
                        findings: partial_findings(&tool_calls),
                        tool_calls,
                        severity: Severity::Info,
                        truncated: false,
                        error: Some(failure),
                    });
                }
            };
        }
    }

    /// Runs one tool call. `Err` carries the interrupted call and the reason
    /// the whole worker has to stop.
    async fn call_tool(
        &self,
        task: &WorkerTask,
        request: ToolCallRequest,
        cancel: &CancellationToken,
        worker_started: Instant,
    ) -> Result<ToolCallRecord, (ToolCallRecord, WorkerFailure)> {
        let mut record = ToolCallRecord {
            tool_name: request.tool_name.clone(),
            input: request.params.clone(),
            output: None,
            error: None,
            duration_ms: 0,
        };

        if !self.scope.allows(&request.tool_name) {
            let refused = ToolError::NotPermitted {
                tool_name: request.tool_name.clone(),
                domain: self.domain.to_string(),
            };
            warn!(domain = %self.domain, tool = %request.tool_name, "Refusing tool outside allow-list");
            record.error = Some(refused.to_string());
            return Ok(record);
        }

        let call_started = Instant::now();
        let timeout = self.settings.tool_call_timeout;
        let outcome = bounded(
            cancel,
            task.deadline,
            tokio::time::timeout(timeout, self.gateway.invoke(&request.tool_name, request.params)),
        )
        .await;
        record.duration_ms = call_started.elapsed().as_millis() as u64;

        match outcome {
            Bounded::Done(Ok(Ok(output))) => {
                record.output = Some(output);
                Ok(record)
            }
            Bounded::Done(Ok(Err(e))) => {
                debug!(domain = %self.domain, tool = %record.tool_name, error = %e, "Tool call failed");
                record.error = Some(e.to_string());
                Ok(record)
            }
            Bounded::Done(Err(_)) => {
                let e = ToolError::Timeout(timeout.as_millis() as u64);
                debug!(domain = %self.domain, tool = %record.tool_name, error = %e, "Tool call timed out");
                record.error = Some(e.to_string());
                Ok(record)
            }
            Bounded::DeadlineReached => {
                record.error = Some("interrupted by task deadline".to_string());
                let after_ms = worker_started.elapsed().as_millis() as u64;
                Err((record, WorkerFailure::Timeout { after_ms }))
            }
            Bounded::Cancelled => {
                record.error = Some("interrupted by cancellation".to_string());
                Err((record, WorkerFailure::Cancelled))
            }
        }
    }

    fn publish_tool_event(&self, task: &WorkerTask, record: &ToolCallRecord) {
        self.observer.on_event(InvestigationEvent::ToolInvoked {
            investigation_id: task.investigation_id,
            domain: self.domain.clone(),
            tool_name: record.tool_name.clone(),
            success: record.succeeded(),
            duration_ms: record.duration_ms,
            invoked_at: Utc::now(),
        });
    }

    fn render_prompt(&self, task: &WorkerTask, tool_calls: &[ToolCallRecord], iteration: u32) -> String {
        let mut prompt = format!(
            "You are the '{}' specialist in an incident investigation.\n\nQuestion: {}\n",
            self.domain, task.query
        );

        if !task.context.is_empty() {
            prompt.push_str("\nContext:\n");
            let mut keys: Vec<&String> = task.context.keys().collect();
            keys.sort();
            for key in keys {
                prompt.push_str(&format!("- {}: {}\n", key, compact(&task.context[key])));
            }
        }

        if tool_calls.is_empty() {
            prompt.push_str("\nNo tools have been called yet.\n");
        } else {
            prompt.push_str("\nObservations so far:\n");
            for (idx, call) in tool_calls.iter().enumerate() {
                let outcome = match (&call.output, &call.error) {
                    (_, Some(error)) => format!("error: {}", error),
                    (Some(output), None) => compact(output),
                    (None, None) => "no output".to_string(),
                };
                prompt.push_str(&format!(
                    "{}. {}({}) -> {}\n",
                    idx + 1,
                    call.tool_name,
                    compact(&call.input),
                    outcome
                ));
            }
        }

        prompt.push_str(&format!(
            "\nStep {} of {}. Call one tool or give your final findings.\n",
            iteration, self.settings.max_iterations
        ));
        prompt
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(text: String, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

/// `"<tool>: <compact output>"` for every successful call so far.
fn partial_findings(tool_calls: &[ToolCallRecord]) -> Vec<String> {
    tool_calls
        .iter()
        .filter_map(|call| {
            let output = call.output.as_ref().filter(|_| call.error.is_none())?;
            Some(truncate_chars(
                format!("{}: {}", call.tool_name, compact(output)),
                PARTIAL_FINDING_LIMIT,
            ))
        })
        .collect()
}
