// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Memory Store
//!
//! Process-local [`MemoryStore`] for development, tests and single-node use.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Append-only record log with namespace-scoped, ranked retrieval
//! - **Pattern:** Repository (DDD)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::domain::config::{ScoringConfig, ScoringStrategy};
use crate::domain::memory::{
    BlendedScorer, LexicalScorer, MemoryError, MemoryRecord, MemoryRetention, MemoryStore,
    Namespace, RecencyScorer, RecordId, RelevanceScorer, StoredRecord,
};

/// Build the scorer selected by configuration.
pub fn scorer_from_config(config: &ScoringConfig) -> Arc<dyn RelevanceScorer> {
    let recency = RecencyScorer {
        decay_per_day: config.recency_decay_per_day,
    };
    match config.strategy {
        ScoringStrategy::Recency => Arc::new(recency),
        ScoringStrategy::Lexical => Arc::new(LexicalScorer),
        ScoringStrategy::Blended => Arc::new(BlendedScorer {
            recency,
            recency_weight: config.recency_weight,
            relevance_weight: config.relevance_weight,
        }),
    }
}

#[derive(Clone)]
pub struct InMemoryMemoryStore {
    records: Arc<RwLock<Vec<StoredRecord>>>,
    scorer: Arc<dyn RelevanceScorer>,
    retention: MemoryRetention,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            scorer: Arc::new(BlendedScorer::default()),
            retention: MemoryRetention::default(),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_retention(mut self, retention: MemoryRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Append a record with an explicit write time, e.g. when backfilling.
    pub fn import(
        &self,
        namespace: &str,
        record: MemoryRecord,
        written_at: DateTime<Utc>,
    ) -> Result<RecordId, MemoryError> {
        let namespace = Namespace::parse(namespace)?;
        let id = RecordId::new();
        self.records.write().push(StoredRecord {
            id,
            namespace,
            record,
            written_at,
        });
        Ok(id)
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn put(&self, namespace: &str, record: MemoryRecord) -> Result<RecordId, MemoryError> {
        let id = self.import(namespace, record, Utc::now())?;
        debug!(namespace, record_id = %id.0, "Memory record appended");
        Ok(id)
    }

    async fn query(
        &self,
        namespace_prefix: &str,
        relevance_query: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, MemoryError> {
        let prefix = Namespace::parse(namespace_prefix)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();

        // (score, insertion index, record); the index orders same-instant writes.
        let mut scored: Vec<(f64, usize, StoredRecord)> = {
            let records = self.records.read();
            records
                .iter()
                .enumerate()
                .filter(|(_, r)| prefix.contains(&r.namespace))
                .filter(|(_, r)| !self.retention.is_expired(r, now))
                .map(|(idx, r)| (self.scorer.score(relevance_query, r, now), idx, r.clone()))
                .collect()
        };

        scored.sort_by(|(score_a, idx_a, a), (score_b, idx_b, b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.written_at.cmp(&a.written_at))
                .then_with(|| idx_b.cmp(idx_a))
        });
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, _, r)| r).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::investigation::{DomainName, InvestigationId};
    use crate::domain::memory::{HistoryRecord, KnowledgeRecord, Outcome, PreferenceRecord};
    use std::collections::BTreeMap;

    fn history(query: &str) -> MemoryRecord {
        MemoryRecord::History(HistoryRecord {
            investigation_id: InvestigationId::new(),
            query: query.to_string(),
            domains: vec![DomainName::new("metrics")],
            summary: "1 of 1 domains reported findings".to_string(),
            root_cause: None,
            outcome: Outcome::Complete,
        })
    }

    fn knowledge(finding: &str) -> MemoryRecord {
        let mut attributes = BTreeMap::new();
        attributes.insert("findings".to_string(), finding.to_string());
        MemoryRecord::Knowledge(KnowledgeRecord {
            scope_key: "infra".to_string(),
            attributes,
        })
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let store = InMemoryMemoryStore::new();
        store.put("/investigations/alice/s1", history("first")).await.unwrap();
        store.put("/investigations/alice/s1", history("second")).await.unwrap();

        let records = store.query("/investigations/alice", "", 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(store.len(), 2);
        // Equal relevance: most recent first.
        match &records[0].record {
            MemoryRecord::History(h) => assert_eq!(h.query, "second"),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_namespace_isolation() {
        let store = InMemoryMemoryStore::new();
        store.put("/infra/alice", knowledge("alice disk")).await.unwrap();
        store.put("/infra/alicia", knowledge("alicia disk")).await.unwrap();
        store.put("/infra/bob", knowledge("bob disk")).await.unwrap();
        store.put("/logs/alice", knowledge("alice logs")).await.unwrap();

        let records = store.query("/infra/alice", "disk", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].namespace.user_id, "alice");
        assert_eq!(records[0].namespace.domain, "infra");
    }

    #[tokio::test]
    async fn test_session_prefix_scoping() {
        let store = InMemoryMemoryStore::new();
        store.put("/investigations/alice/s1", history("one")).await.unwrap();
        store.put("/investigations/alice/s2", history("two")).await.unwrap();
        store.put("/investigations/alice", history("none")).await.unwrap();

        assert_eq!(store.query("/investigations/alice", "", 10).await.unwrap().len(), 3);
        assert_eq!(store.query("/investigations/alice/s1", "", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_namespaces_rejected() {
        let store = InMemoryMemoryStore::new();
        assert!(matches!(
            store.put("infra/alice", knowledge("x")).await,
            Err(MemoryError::InvalidNamespace(_))
        ));
        assert!(matches!(
            store.put("/infra/alice/s1/extra", knowledge("x")).await,
            Err(MemoryError::InvalidNamespace(_))
        ));
        assert!(matches!(
            store.query("/infra", "x", 5).await,
            Err(MemoryError::InvalidNamespace(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_retention_filters_expired_records() {
        let store = InMemoryMemoryStore::new();
        store
            .import("/infra/alice", knowledge("stale"), Utc::now() - chrono::Duration::days(45))
            .unwrap();
        store.put("/infra/alice", knowledge("fresh")).await.unwrap();
        let preference = MemoryRecord::Preference(PreferenceRecord {
            user_id: "alice".to_string(),
            attributes: BTreeMap::new(),
        });
        store
            .import("/preferences/alice", preference, Utc::now() - chrono::Duration::days(45))
            .unwrap();

        assert_eq!(store.query("/infra/alice", "", 10).await.unwrap().len(), 1);
        assert_eq!(store.query("/preferences/alice", "", 10).await.unwrap().len(), 1);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_relevance_ranking_and_limit() {
        let store = InMemoryMemoryStore::new();
        store.put("/infra/alice", knowledge("certificate expiry")).await.unwrap();
        store.put("/infra/alice", knowledge("disk pressure on node-7")).await.unwrap();
        store.put("/infra/alice", knowledge("dns flapping")).await.unwrap();

        let records = store.query("/infra/alice", "disk pressure", 1).await.unwrap();
        assert_eq!(records.len(), 1);
        match &records[0].record {
            MemoryRecord::Knowledge(k) => assert_eq!(k.attributes["findings"], "disk pressure on node-7"),
            other => panic!("unexpected record {:?}", other),
        }
        assert!(store.query("/infra/alice", "disk", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = InMemoryMemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put("/investigations/alice", history(&format!("q{}", i)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.query("/investigations/alice", "", 100).await.unwrap().len(), 32);
    }

    #[test]
    fn test_scorer_selection() {
        let mut config = ScoringConfig::default();
        config.strategy = ScoringStrategy::Lexical;
        let scorer = scorer_from_config(&config);
        let record = StoredRecord {
            id: RecordId::new(),
            namespace: Namespace::parse("/infra/alice").unwrap(),
            record: knowledge("disk"),
            written_at: Utc::now(),
        };
        assert_eq!(scorer.score("disk", &record, Utc::now()), 1.0);
    }
}
