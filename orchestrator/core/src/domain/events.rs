// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::investigation::{DomainName, InvestigationId, Severity};

/// Progress of a single investigation, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvestigationEvent {
    InvestigationStarted {
        investigation_id: InvestigationId,
        user_id: String,
        query: String,
        started_at: DateTime<Utc>,
    },
    PlanCreated {
        investigation_id: InvestigationId,
        domains: Vec<DomainName>,
        broad: bool,
        created_at: DateTime<Utc>,
    },
    DomainStarted {
        investigation_id: InvestigationId,
        domain: DomainName,
        started_at: DateTime<Utc>,
    },
    ToolInvoked {
        investigation_id: InvestigationId,
        domain: DomainName,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        invoked_at: DateTime<Utc>,
    },
    DomainFinished {
        investigation_id: InvestigationId,
        domain: DomainName,
        severity: Severity,
        finding_count: usize,
        /// Short failure description when the worker did not complete.
        error: Option<String>,
        finished_at: DateTime<Utc>,
    },
    AggregationStarted {
        investigation_id: InvestigationId,
        result_count: usize,
        started_at: DateTime<Utc>,
    },
    InvestigationCompleted {
        investigation_id: InvestigationId,
        warning_count: usize,
        escalated: bool,
        completed_at: DateTime<Utc>,
    },
}

impl InvestigationEvent {
    pub fn investigation_id(&self) -> InvestigationId {
        match self {
            Self::InvestigationStarted { investigation_id, .. }
            | Self::PlanCreated { investigation_id, .. }
            | Self::DomainStarted { investigation_id, .. }
            | Self::ToolInvoked { investigation_id, .. }
            | Self::DomainFinished { investigation_id, .. }
            | Self::AggregationStarted { investigation_id, .. }
            | Self::InvestigationCompleted { investigation_id, .. } => *investigation_id,
        }
    }
}

/// Receives progress events. Must not block: it is called inline from
/// workers and the supervisor.
pub trait InvestigationObserver: Send + Sync {
    fn on_event(&self, event: InvestigationEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl InvestigationObserver for NoopObserver {
    fn on_event(&self, _event: InvestigationEvent) {}
}

/// Forwards each event to every inner observer, in order.
#[derive(Clone, Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn InvestigationObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn InvestigationObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl InvestigationObserver for CompositeObserver {
    fn on_event(&self, event: InvestigationEvent) {
        if let Some((last, rest)) = self.observers.split_last() {
            for observer in rest {
                observer.on_event(event.clone());
            }
            last.on_event(event);
        }
    }
}
