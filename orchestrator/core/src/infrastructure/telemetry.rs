// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Span exporter that logs through `tracing` and records `metrics`.
//!
//! Metrics are emitted through the global `metrics` recorder; with none
//! installed they are no-ops.

use tracing::{info, warn};

use crate::domain::events::{InvestigationEvent, InvestigationObserver};
use crate::domain::telemetry::{SpanExporter, SpanRecord, SpanStatus};

pub const METRIC_SPANS_TOTAL: &str = "triage_spans_total";
pub const METRIC_SPAN_DURATION_SECONDS: &str = "triage_span_duration_seconds";
pub const METRIC_WORKER_RESULTS_TOTAL: &str = "triage_worker_results_total";
pub const METRIC_TOOL_CALLS_TOTAL: &str = "triage_tool_calls_total";

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSpanExporter;

impl SpanExporter for TracingSpanExporter {
    fn record_span(&self, span: SpanRecord) {
        let status = match span.status {
            SpanStatus::Ok => "ok",
            SpanStatus::Error => "error",
        };
        let duration_ms = span.duration.as_millis() as u64;

        match span.status {
            SpanStatus::Ok => info!(
                target: "triage::spans",
                span = %span.name,
                investigation_id = %span.investigation_id,
                duration_ms,
                attributes = ?span.attributes,
                "Span finished"
            ),
            SpanStatus::Error => warn!(
                target: "triage::spans",
                span = %span.name,
                investigation_id = %span.investigation_id,
                duration_ms,
                attributes = ?span.attributes,
                "Span finished with error"
            ),
        }

        metrics::counter!(METRIC_SPANS_TOTAL, "span" => span.name.clone(), "status" => status).increment(1);
        metrics::histogram!(METRIC_SPAN_DURATION_SECONDS, "span" => span.name)
            .record(span.duration.as_secs_f64());
    }
}

/// Counts per-domain outcomes and tool calls from the event stream.
impl InvestigationObserver for TracingSpanExporter {
    fn on_event(&self, event: InvestigationEvent) {
        match event {
            InvestigationEvent::DomainFinished { domain, error, .. } => {
                let outcome = if error.is_some() { "failed" } else { "complete" };
                metrics::counter!(
                    METRIC_WORKER_RESULTS_TOTAL,
                    "domain" => domain.as_str().to_string(),
                    "outcome" => outcome
                )
                .increment(1);
            }
            InvestigationEvent::ToolInvoked { domain, success, .. } => {
                metrics::counter!(
                    METRIC_TOOL_CALLS_TOTAL,
                    "domain" => domain.as_str().to_string(),
                    "success" => if success { "true" } else { "false" }
                )
                .increment(1);
            }
            _ => {}
        }
    }
}
