// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Long-lived Memory
//!
//! Namespaced, append-only records in three retention classes:
//!
//! | Strategy | Namespace | Default retention |
//! |----------|-----------|-------------------|
//! | [`PreferenceRecord`] | `/preferences/{user_id}` | 90 days |
//! | [`KnowledgeRecord`] | `/{domain}/{user_id}` | 30 days |
//! | [`HistoryRecord`] | `/investigations/{user_id}[/{session_id}]` | 30 days |
//!
//! Records are never updated in place. A newer record supersedes an older one
//! simply by ranking above it at retrieval time.
//!
//! Ranking is pluggable through [`RelevanceScorer`]; the store breaks score ties
//! most-recent-first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::investigation::{DomainName, InvestigationId};

/// Namespace domain for preference records.
pub const PREFERENCES_DOMAIN: &str = "preferences";
/// Namespace domain for investigation history records.
pub const HISTORY_DOMAIN: &str = "investigations";

/// Namespace domains owned by the memory layer itself. Specialist domains
/// may not use them.
pub fn is_reserved_domain(name: &str) -> bool {
    name == PREFERENCES_DOMAIN || name == HISTORY_DOMAIN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed `/{domain}/{user_id}[/{session_id}]` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub domain: String,
    pub user_id: String,
    pub session_id: Option<String>,
}

impl Namespace {
    pub fn new(
        domain: impl Into<String>,
        user_id: impl Into<String>,
        session_id: Option<String>,
    ) -> Result<Self, MemoryError> {
        let namespace = Self {
            domain: domain.into(),
            user_id: user_id.into(),
            session_id,
        };
        let segments_ok = Self::is_valid_segment(&namespace.domain)
            && Self::is_valid_segment(&namespace.user_id)
            && namespace
                .session_id
                .as_deref()
                .map(Self::is_valid_segment)
                .unwrap_or(true);
        if !segments_ok {
            return Err(MemoryError::InvalidNamespace(namespace.to_string()));
        }
        Ok(namespace)
    }

    pub fn preferences(user_id: &str) -> Result<Self, MemoryError> {
        Self::new(PREFERENCES_DOMAIN, user_id, None)
    }

    pub fn knowledge(domain: &DomainName, user_id: &str) -> Result<Self, MemoryError> {
        if is_reserved_domain(domain.as_str()) {
            return Err(MemoryError::InvalidNamespace(format!("/{}/{}", domain, user_id)));
        }
        Self::new(domain.as_str(), user_id, None)
    }

    pub fn history(user_id: &str, session_id: Option<&str>) -> Result<Self, MemoryError> {
        Self::new(HISTORY_DOMAIN, user_id, session_id.map(str::to_string))
    }

    pub fn parse(raw: &str) -> Result<Self, MemoryError> {
        let invalid = || MemoryError::InvalidNamespace(raw.to_string());
        let rest = raw.strip_prefix('/').ok_or_else(invalid)?;
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [domain, user] => Self::new(*domain, *user, None).map_err(|_| invalid()),
            [domain, user, session] => {
                Self::new(*domain, *user, Some(session.to_string())).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }

    /// Non-empty ASCII alphanumerics plus `-_.@:`.
    pub fn is_valid_segment(segment: &str) -> bool {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | ':'))
    }

    /// Segment-wise prefix match. A namespace without a session segment covers
    /// every session of the same user.
    pub fn contains(&self, other: &Namespace) -> bool {
        if self.domain != other.domain || self.user_id != other.user_id {
            return false;
        }
        match &self.session_id {
            None => true,
            Some(session) => other.session_id.as_deref() == Some(session.as_str()),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.domain, self.user_id)?;
        if let Some(session) = &self.session_id {
            write!(f, "/{}", session)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub user_id: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub scope_key: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Complete,
    Partial,
    Inconclusive,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Inconclusive => "inconclusive",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub investigation_id: InvestigationId,
    pub query: String,
    pub domains: Vec<DomainName>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MemoryRecord {
    Preference(PreferenceRecord),
    Knowledge(KnowledgeRecord),
    History(HistoryRecord),
}

impl MemoryRecord {
    pub fn retention_class(&self) -> RetentionClass {
        match self {
            Self::Preference(_) => RetentionClass::Preference,
            Self::Knowledge(_) => RetentionClass::Knowledge,
            Self::History(_) => RetentionClass::History,
        }
    }

    /// Text used by lexical scoring.
    pub fn searchable_text(&self) -> String {
        match self {
            Self::Preference(p) => p
                .attributes
                .iter()
                .map(|(k, v)| format!("{} {}", k, v))
                .collect::<Vec<_>>()
                .join(" "),
            Self::Knowledge(k) => {
                let mut text = k.scope_key.clone();
                for (key, value) in &k.attributes {
                    text.push(' ');
                    text.push_str(key);
                    text.push(' ');
                    text.push_str(value);
                }
                text
            }
            Self::History(h) => {
                let mut text = format!("{} {}", h.query, h.summary);
                if let Some(cause) = &h.root_cause {
                    text.push(' ');
                    text.push_str(cause);
                }
                for domain in &h.domains {
                    text.push(' ');
                    text.push_str(domain.as_str());
                }
                text
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionClass {
    Preference,
    Knowledge,
    History,
}

/// Retention windows per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRetention {
    #[serde(with = "humantime_serde", default = "default_preference_retention")]
    pub preferences: Duration,
    #[serde(with = "humantime_serde", default = "default_short_retention")]
    pub knowledge: Duration,
    #[serde(with = "humantime_serde", default = "default_short_retention")]
    pub history: Duration,
}

const DAY: u64 = 24 * 60 * 60;

fn default_preference_retention() -> Duration {
    Duration::from_secs(90 * DAY)
}

fn default_short_retention() -> Duration {
    Duration::from_secs(30 * DAY)
}

impl Default for MemoryRetention {
    fn default() -> Self {
        Self {
            preferences: default_preference_retention(),
            knowledge: default_short_retention(),
            history: default_short_retention(),
        }
    }
}

impl MemoryRetention {
    pub fn window(&self, class: RetentionClass) -> Duration {
        match class {
            RetentionClass::Preference => self.preferences,
            RetentionClass::Knowledge => self.knowledge,
            RetentionClass::History => self.history,
        }
    }

    pub fn is_expired(&self, record: &StoredRecord, now: DateTime<Utc>) -> bool {
        let window = self.window(record.record.retention_class());
        match chrono::Duration::from_std(window) {
            Ok(window) => now - record.written_at > window,
            // Out of chrono's range means effectively unbounded.
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub namespace: Namespace,
    pub record: MemoryRecord,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Memory store unavailable: {0}")]
    Unavailable(String),
}

/// Namespaced, append-only memory.
///
/// Implementations own their synchronization; callers never lock.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append `record` under `namespace`.
    async fn put(&self, namespace: &str, record: MemoryRecord) -> Result<RecordId, MemoryError>;

    /// Return up to `limit` live records under `namespace_prefix`, best first.
    async fn query(
        &self,
        namespace_prefix: &str,
        relevance_query: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, MemoryError>;
}

/// Scores a record against a free-text query. Higher is better.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, query: &str, record: &StoredRecord, now: DateTime<Utc>) -> f64;
}

/// Exponential age decay, `exp(-decay_per_day * age_days)`.
#[derive(Debug, Clone, Copy)]
pub struct RecencyScorer {
    pub decay_per_day: f64,
}

impl Default for RecencyScorer {
    fn default() -> Self {
        Self { decay_per_day: 0.01 }
    }
}

impl RelevanceScorer for RecencyScorer {
    fn score(&self, _query: &str, record: &StoredRecord, now: DateTime<Utc>) -> f64 {
        let age_days = (now - record.written_at).num_seconds().max(0) as f64 / DAY as f64;
        (-self.decay_per_day * age_days).exp()
    }
}

/// Fraction of distinct query tokens present in the record's text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

pub(crate) fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl RelevanceScorer for LexicalScorer {
    fn score(&self, query: &str, record: &StoredRecord, _now: DateTime<Utc>) -> f64 {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return 0.0;
        }
        let record_tokens = tokenize(&record.record.searchable_text());
        let hits = query_tokens
            .iter()
            .filter(|t| record_tokens.contains(*t))
            .count();
        hits as f64 / query_tokens.len() as f64
    }
}

/// Weighted sum of [`RecencyScorer`] and [`LexicalScorer`].
#[derive(Debug, Clone, Copy)]
pub struct BlendedScorer {
    pub recency: RecencyScorer,
    pub recency_weight: f64,
    pub relevance_weight: f64,
}

impl Default for BlendedScorer {
    fn default() -> Self {
        Self {
            recency: RecencyScorer::default(),
            recency_weight: 0.3,
            relevance_weight: 0.7,
        }
    }
}

impl RelevanceScorer for BlendedScorer {
    fn score(&self, query: &str, record: &StoredRecord, now: DateTime<Utc>) -> f64 {
        self.recency_weight * self.recency.score(query, record, now)
            + self.relevance_weight * LexicalScorer.score(query, record, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(namespace: &str, record: MemoryRecord, age_days: i64) -> StoredRecord {
        StoredRecord {
            id: RecordId::new(),
            namespace: Namespace::parse(namespace).unwrap(),
            record,
            written_at: Utc::now() - chrono::Duration::days(age_days),
        }
    }

    fn knowledge(text: &str) -> MemoryRecord {
        let mut attributes = BTreeMap::new();
        attributes.insert("finding".to_string(), text.to_string());
        MemoryRecord::Knowledge(KnowledgeRecord {
            scope_key: "infra".to_string(),
            attributes,
        })
    }

    #[test]
    fn test_namespace_parsing() {
        let ns = Namespace::parse("/infra/alice").unwrap();
        assert_eq!(ns.domain, "infra");
        assert_eq!(ns.user_id, "alice");
        assert_eq!(ns.session_id, None);
        assert_eq!(ns.to_string(), "/infra/alice");

        let ns = Namespace::parse("/investigations/alice/s-1").unwrap();
        assert_eq!(ns.session_id.as_deref(), Some("s-1"));

        for bad in ["", "/", "infra/alice", "/infra", "/infra//alice", "/a/b/c/d", "/infra/al ice"] {
            assert!(
                matches!(Namespace::parse(bad), Err(MemoryError::InvalidNamespace(_))),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_knowledge_cannot_use_reserved_domains() {
        for reserved in [PREFERENCES_DOMAIN, HISTORY_DOMAIN] {
            assert!(matches!(
                Namespace::knowledge(&DomainName::new(reserved), "alice"),
                Err(MemoryError::InvalidNamespace(_))
            ));
        }
        let ns = Namespace::knowledge(&DomainName::new("infra"), "alice").unwrap();
        assert_eq!(ns.to_string(), "/infra/alice");
    }

    #[test]
    fn test_contains_is_segment_wise() {
        let alice = Namespace::parse("/investigations/alice").unwrap();
        let alice_session = Namespace::parse("/investigations/alice/s1").unwrap();
        let alicia = Namespace::parse("/investigations/alicia").unwrap();

        assert!(alice.contains(&alice_session));
        assert!(alice.contains(&alice));
        assert!(!alice.contains(&alicia));
        assert!(!alice_session.contains(&alice));
        assert!(!alice_session.contains(&Namespace::parse("/investigations/alice/s2").unwrap()));
    }

    #[test]
    fn test_recency_decays() {
        let scorer = RecencyScorer::default();
        let now = Utc::now();
        let fresh = stored("/infra/alice", knowledge("x"), 0);
        let old = stored("/infra/alice", knowledge("x"), 100);
        let fresh_score = scorer.score("", &fresh, now);
        let old_score = scorer.score("", &old, now);
        assert!(fresh_score > 0.99);
        assert!((old_score - (-1.0f64).exp()).abs() < 0.01);
    }

    #[test]
    fn test_lexical_overlap() {
        let record = stored("/infra/alice", knowledge("disk pressure on node-7"), 0);
        let now = Utc::now();
        assert_eq!(LexicalScorer.score("", &record, now), 0.0);
        assert_eq!(LexicalScorer.score("Disk pressure", &record, now), 1.0);
        assert_eq!(LexicalScorer.score("disk latency", &record, now), 0.5);
    }

    #[test]
    fn test_blended_prefers_relevant_over_recent() {
        let scorer = BlendedScorer::default();
        let now = Utc::now();
        let relevant_old = stored("/infra/alice", knowledge("api latency regression"), 20);
        let irrelevant_new = stored("/infra/alice", knowledge("certificate renewal"), 0);
        assert!(
            scorer.score("api latency", &relevant_old, now)
                > scorer.score("api latency", &irrelevant_new, now)
        );
    }

    #[test]
    fn test_retention_windows() {
        let retention = MemoryRetention::default();
        let now = Utc::now();
        assert!(!retention.is_expired(&stored("/infra/alice", knowledge("x"), 29), now));
        assert!(retention.is_expired(&stored("/infra/alice", knowledge("x"), 31), now));

        let pref = MemoryRecord::Preference(PreferenceRecord {
            user_id: "alice".to_string(),
            attributes: BTreeMap::new(),
        });
        assert!(!retention.is_expired(&stored("/preferences/alice", pref, 60), now));
    }
}
