// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Model-backed investigation planner.
//!
//! Expected reply: `{"steps": [{"domain": "logs", "rationale": "..."}]}`.
//! A bare array of steps is accepted too. Anything else yields no proposals
//! and the supervisor falls back to keyword routing alone.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::extract_json;
use crate::domain::investigation::{InvestigationRequest, PlanStep};
use crate::domain::llm::{GenerationOptions, LLMError, LLMProvider, PlanCandidate, PlanningContext, PlanningModel};

#[derive(Deserialize)]
struct WireStep {
    domain: String,
    #[serde(default)]
    rationale: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePlan {
    Object { steps: Vec<WireStep> },
    Steps(Vec<WireStep>),
}

pub struct LlmPlanner {
    provider: Arc<dyn LLMProvider>,
    options: GenerationOptions,
}

impl LlmPlanner {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            options: GenerationOptions {
                temperature: Some(0.0),
                ..GenerationOptions::default()
            },
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

fn render(request: &InvestigationRequest, candidates: &[PlanCandidate], context: &PlanningContext) -> String {
    let mut prompt = String::from(
        "You plan incident investigations. Pick the specialist domains that should look into the question.\n\n",
    );
    prompt.push_str(&format!("Question: {}\n\nDomains:\n", request.query));
    for candidate in candidates {
        prompt.push_str(&format!("- {}: {}\n", candidate.domain, candidate.description));
    }

    if !context.keyword_domains.is_empty() {
        let names: Vec<&str> = context.keyword_domains.iter().map(|d| d.as_str()).collect();
        prompt.push_str(&format!("\nAlready selected by keywords: {}\n", names.join(", ")));
    }
    if !context.memories.is_empty() {
        prompt.push_str("\nRelevant memory:\n");
        for memory in &context.memories {
            prompt.push_str(&format!("- {}\n", memory));
        }
    }
    if !context.recent_turns.is_empty() {
        prompt.push_str(&format!(
            "\nConversation so far ({} messages, most recent last):\n",
            context.session_turns
        ));
        for turn in &context.recent_turns {
            prompt.push_str(&format!("- {}\n", turn));
        }
    }

    prompt.push_str(
        "\nRespond with JSON only: {\"steps\": [{\"domain\": \"<domain>\", \"rationale\": \"<why>\"}]}\n",
    );
    prompt
}

pub(crate) fn parse_steps(text: &str) -> Vec<PlanStep> {
    let wire = match serde_json::from_str::<WirePlan>(extract_json(text)) {
        Ok(WirePlan::Object { steps }) | Ok(WirePlan::Steps(steps)) => steps,
        Err(e) => {
            warn!("Planner reply was not a usable plan: {}", e);
            return Vec::new();
        }
    };

    wire.into_iter()
        .filter(|step| !step.domain.trim().is_empty())
        .map(|step| PlanStep::new(step.domain.as_str(), step.rationale.trim()))
        .collect()
}

#[async_trait]
impl PlanningModel for LlmPlanner {
    async fn propose(
        &self,
        request: &InvestigationRequest,
        candidates: &[PlanCandidate],
        context: &PlanningContext,
    ) -> Result<Vec<PlanStep>, LLMError> {
        let response = self
            .provider
            .generate(&render(request, candidates, context), &self.options)
            .await?;
        let steps = parse_steps(&response.text);
        debug!(proposed = steps.len(), provider = %response.provider, "Planner proposed steps");
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::investigation::DomainName;

    #[test]
    fn test_parse_object_and_array_forms() {
        let steps = parse_steps(r#"{"steps": [{"domain": "Logs", "rationale": "error spike"}]}"#);
        assert_eq!(steps, vec![PlanStep::new("logs", "error spike")]);

        let steps = parse_steps(r#"[{"domain": "infra"}, {"domain": " "}]"#);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].domain, DomainName::new("infra"));

        let steps = parse_steps(r#"[{"domain": "metrics", "rationale": "p99 jump"}]"#);
        assert_eq!(steps, vec![PlanStep::new("metrics", "p99 jump")]);
    }

    #[test]
    fn test_unparseable_reply_yields_no_steps() {
        assert!(parse_steps("I think you should check the logs.").is_empty());
    }

    #[test]
    fn test_prompt_includes_context() {
        let request = InvestigationRequest::new("checkout latency spiked", "alice", "s1");
        let candidates = vec![PlanCandidate {
            domain: DomainName::new("metrics"),
            description: "Time-series metrics".into(),
        }];
        let context = PlanningContext {
            keyword_domains: vec![DomainName::new("metrics")],
            memories: vec!["previous: disk pressure on node-7".into()],
            session_turns: 2,
            recent_turns: vec!["user: is it the database?".into()],
        };

        let prompt = render(&request, &candidates, &context);
        assert!(prompt.contains("Question: checkout latency spiked"));
        assert!(prompt.contains("- metrics: Time-series metrics"));
        assert!(prompt.contains("Already selected by keywords: metrics"));
        assert!(prompt.contains("previous: disk pressure on node-7"));
        assert!(prompt.contains("user: is it the database?"));
    }
}
