// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Telemetry
//!
//! Span records handed to the observability exporter.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Exporter seam; wire formats live behind it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::investigation::InvestigationId;

pub const SPAN_INVESTIGATION: &str = "investigation";
pub const SPAN_PLAN: &str = "investigation.plan";
pub const SPAN_DISPATCH: &str = "investigation.dispatch";
pub const SPAN_AGGREGATE: &str = "investigation.aggregate";
pub const SPAN_PERSIST: &str = "investigation.persist";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub name: String,
    pub investigation_id: InvestigationId,
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub status: SpanStatus,
    pub attributes: BTreeMap<String, String>,
}

impl SpanRecord {
    pub fn new(
        name: impl Into<String>,
        investigation_id: InvestigationId,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            investigation_id,
            started_at,
            duration,
            status: SpanStatus::Ok,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.insert(key.into(), value.to_string());
        self
    }
}

/// Fire-and-forget span sink. Implementations must return promptly.
pub trait SpanExporter: Send + Sync {
    fn record_span(&self, span: SpanRecord);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpanExporter;

impl SpanExporter for NoopSpanExporter {
    fn record_span(&self, _span: SpanRecord) {}
}
