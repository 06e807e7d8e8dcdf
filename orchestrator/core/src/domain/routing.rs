// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Routing
//!
//! Deterministic keyword classification plus plan assembly.
//!
//! ## Plan Assembly Rules
//! | Keyword matches | Result |
//! |-----------------|--------|
//! | none | broad plan: every configured domain, in configuration order |
//! | one or more | every matching domain (no tie-break), then planner-proposed configured domains |
//!
//! Planner proposals naming unconfigured domains are dropped. Plans are capped
//! at [`MAX_PLAN_STEPS`].

use std::collections::HashSet;
use tracing::debug;

use crate::domain::investigation::{
    DomainName, InvestigationPlan, PlanError, PlanStep, MAX_PLAN_STEPS,
};
use crate::domain::llm::PlanCandidate;

#[derive(Debug, Clone, PartialEq)]
pub struct DomainRoute {
    pub domain: DomainName,
    pub description: String,
    pub keywords: Vec<String>,
}

impl DomainRoute {
    pub fn new(domain: impl Into<DomainName>, description: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            domain: domain.into(),
            description: description.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub domain: DomainName,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordRouter {
    routes: Vec<DomainRoute>,
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `latency` matches `latency`, `latencies` does not; `time` matches `times`.
fn word_matches(query_word: &str, keyword_word: &str) -> bool {
    query_word == keyword_word
        || query_word
            .strip_prefix(keyword_word)
            .map(|suffix| suffix == "s" || suffix == "es")
            .unwrap_or(false)
}

fn phrase_in(query_words: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > query_words.len() {
        return false;
    }
    query_words
        .windows(phrase.len())
        .any(|window| window.iter().zip(phrase).all(|(q, k)| word_matches(q, k)))
}

impl KeywordRouter {
    pub fn new(routes: Vec<DomainRoute>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[DomainRoute] {
        &self.routes
    }

    pub fn candidates(&self) -> Vec<PlanCandidate> {
        self.routes
            .iter()
            .map(|r| PlanCandidate {
                domain: r.domain.clone(),
                description: r.description.clone(),
            })
            .collect()
    }

    /// Every domain with at least one whole-word keyword hit, in route order.
    pub fn classify(&self, query: &str) -> Vec<RouteMatch> {
        let query_words = words(query);
        self.routes
            .iter()
            .filter_map(|route| {
                let hits: Vec<String> = route
                    .keywords
                    .iter()
                    .filter(|k| phrase_in(&query_words, &words(k)))
                    .cloned()
                    .collect();
                (!hits.is_empty()).then(|| RouteMatch {
                    domain: route.domain.clone(),
                    keywords: hits,
                })
            })
            .collect()
    }

    pub fn build_plan(
        &self,
        matches: &[RouteMatch],
        proposed: Vec<PlanStep>,
    ) -> Result<InvestigationPlan, PlanError> {
        if matches.is_empty() {
            let steps = self
                .routes
                .iter()
                .take(MAX_PLAN_STEPS)
                .map(|r| PlanStep::new(r.domain.clone(), "broad investigation: no domain keywords matched"))
                .collect();
            return InvestigationPlan::new(steps, true);
        }

        let configured: HashSet<&DomainName> = self.routes.iter().map(|r| &r.domain).collect();
        let mut seen: HashSet<DomainName> = HashSet::new();
        let mut steps = Vec::new();

        for m in matches {
            if seen.insert(m.domain.clone()) {
                steps.push(PlanStep::new(
                    m.domain.clone(),
                    format!("matched keywords: {}", m.keywords.join(", ")),
                ));
            }
        }

        for step in proposed {
            if !configured.contains(&step.domain) {
                debug!(domain = %step.domain, "Ignoring planner proposal for unconfigured domain");
                continue;
            }
            if seen.insert(step.domain.clone()) {
                steps.push(step);
            }
        }

        steps.truncate(MAX_PLAN_STEPS);
        InvestigationPlan::new(steps, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> KeywordRouter {
        KeywordRouter::new(vec![
            DomainRoute::new("infra", "Hosts and clusters", &["node", "cpu", "disk"]),
            DomainRoute::new("logs", "Application logs", &["error", "stack trace"]),
            DomainRoute::new("metrics", "Time series", &["latency", "response time", "degraded"]),
            DomainRoute::new("runbooks", "Procedures", &["runbook"]),
        ])
    }

    #[test]
    fn test_classify_includes_all_matches() {
        let matches = router().classify("Disk errors and degraded latency on node-3");
        let domains: Vec<&str> = matches.iter().map(|m| m.domain.as_str()).collect();
        assert_eq!(domains, vec!["infra", "logs", "metrics"]);
    }

    #[test]
    fn test_phrases_and_plurals() {
        let matches = router().classify("API response times degraded 3x");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].domain.as_str(), "metrics");
        assert_eq!(matches[0].keywords, vec!["response time", "degraded"]);

        assert!(router().classify("cpus").iter().any(|m| m.domain.as_str() == "infra"));
        // Whole words only.
        assert!(router().classify("terrorism").is_empty());
    }

    #[test]
    fn test_broad_plan_when_nothing_matches() {
        let r = router();
        let plan = r.build_plan(&r.classify("something is off"), vec![]).unwrap();
        assert!(plan.is_broad());
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_proposals_are_appended_and_filtered() {
        let r = router();
        let matches = r.classify("latency");
        let plan = r
            .build_plan(
                &matches,
                vec![
                    PlanStep::new("infra", "saturation?"),
                    PlanStep::new("billing", "not configured"),
                    PlanStep::new("metrics", "duplicate"),
                ],
            )
            .unwrap();
        let domains: Vec<String> = plan.domains().iter().map(|d| d.to_string()).collect();
        assert_eq!(domains, vec!["metrics", "infra"]);
        assert!(!plan.is_broad());
    }

    #[test]
    fn test_plan_is_capped() {
        let routes: Vec<DomainRoute> = (0..7)
            .map(|i| DomainRoute::new(format!("d{}", i).as_str(), "", &["shared"]))
            .collect();
        let r = KeywordRouter::new(routes);
        let plan = r.build_plan(&r.classify("shared"), vec![]).unwrap();
        assert_eq!(plan.len(), MAX_PLAN_STEPS);
    }
}
