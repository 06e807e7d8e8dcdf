// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Worker reasoning over a text-generation provider.
//!
//! The model is asked to answer with one JSON object per step:
//!
//! ```json
//! {"action": "tool_call", "tool_name": "query_metrics", "params": {"metric": "p99"}}
//! {"action": "final", "findings": ["p99 tripled after deploy 42"], "severity": "high"}
//! ```
//!
//! Replies that do not follow the protocol are treated as a final answer
//! carrying the raw text as a single low-severity finding.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::extract_json;
use crate::domain::investigation::Severity;
use crate::domain::llm::{
    Decision, FinalAnswer, GenerationOptions, LLMError, LLMProvider, ModelInference, ToolCallRequest,
};
use crate::domain::tools::ToolDescriptor;

const RESPONSE_PROTOCOL: &str = "Respond with exactly one JSON object and nothing else.\n\
To call a tool: {\"action\": \"tool_call\", \"tool_name\": \"<name>\", \"params\": {...}}\n\
To finish: {\"action\": \"final\", \"findings\": [\"...\"], \"severity\": \"info|low|medium|high|critical\"}\n";

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WireDecision {
    ToolCall {
        tool_name: String,
        #[serde(default)]
        params: Value,
    },
    Final {
        #[serde(default)]
        findings: Vec<String>,
        #[serde(default)]
        severity: Option<String>,
    },
}

pub struct PromptedInference {
    provider: Arc<dyn LLMProvider>,
    options: GenerationOptions,
}

impl PromptedInference {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

fn render(prompt: &str, tools: &[ToolDescriptor]) -> String {
    let mut full = String::from(prompt);
    full.push_str("\nAvailable tools:\n");
    if tools.is_empty() {
        full.push_str("- none\n");
    }
    for tool in tools {
        full.push_str(&format!(
            "- {}: {} (input schema: {})\n",
            tool.name, tool.description, tool.input_schema
        ));
    }
    full.push('\n');
    full.push_str(RESPONSE_PROTOCOL);
    full
}

pub(crate) fn parse_decision(text: &str) -> Decision {
    match serde_json::from_str::<WireDecision>(extract_json(text)) {
        Ok(WireDecision::ToolCall { tool_name, params }) if !tool_name.trim().is_empty() => {
            Decision::ToolCall(ToolCallRequest {
                tool_name: tool_name.trim().to_string(),
                params: if params.is_null() { Value::Object(Default::default()) } else { params },
            })
        }
        Ok(WireDecision::Final { findings, severity }) => {
            let findings: Vec<String> = findings
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            let severity = severity
                .as_deref()
                .and_then(Severity::parse)
                .unwrap_or(if findings.is_empty() { Severity::Info } else { Severity::Low });
            Decision::Final(FinalAnswer { findings, severity })
        }
        _ => {
            let raw = text.trim();
            warn!("Model reply did not follow the decision protocol; keeping it as a finding");
            Decision::Final(FinalAnswer {
                findings: if raw.is_empty() { vec![] } else { vec![raw.to_string()] },
                severity: if raw.is_empty() { Severity::Info } else { Severity::Low },
            })
        }
    }
}

#[async_trait]
impl ModelInference for PromptedInference {
    async fn complete(&self, prompt: &str, tools: &[ToolDescriptor]) -> Result<Decision, LLMError> {
        let response = self.provider.generate(&render(prompt, tools), &self.options).await?;
        debug!(
            provider = %response.provider,
            model = %response.model,
            tokens = response.usage.total_tokens,
            "Worker reasoning step generated"
        );
        Ok(parse_decision(&response.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{FinishReason, GenerationResponse, TokenUsage};
    use parking_lot::Mutex;
    use serde_json::json;

    struct CannedProvider {
        reply: Result<String, LLMError>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLMProvider for CannedProvider {
        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            self.prompts.lock().push(prompt.to_string());
            self.reply.clone().map(|text| GenerationResponse {
                text,
                usage: TokenUsage::default(),
                provider: "canned".into(),
                model: "m".into(),
                finish_reason: FinishReason::Stop,
            })
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    fn canned(reply: Result<&str, LLMError>) -> Arc<CannedProvider> {
        Arc::new(CannedProvider {
            reply: reply.map(str::to_string),
            prompts: Mutex::new(vec![]),
        })
    }

    #[test]
    fn test_parse_tool_call() {
        let decision = parse_decision(
            "```json\n{\"action\": \"tool_call\", \"tool_name\": \"search_logs\", \"params\": {\"q\": \"5xx\"}}\n```",
        );
        assert_eq!(
            decision,
            Decision::ToolCall(ToolCallRequest {
                tool_name: "search_logs".into(),
                params: json!({"q": "5xx"}),
            })
        );
    }

    #[test]
    fn test_parse_final_with_severity() {
        let decision = parse_decision(
            r#"{"action": "final", "findings": ["disk 97% on node-7", " "], "severity": "HIGH"}"#,
        );
        assert_eq!(
            decision,
            Decision::Final(FinalAnswer {
                findings: vec!["disk 97% on node-7".into()],
                severity: Severity::High,
            })
        );
    }

    #[test]
    fn test_missing_params_default_to_empty_object() {
        match parse_decision(r#"{"action": "tool_call", "tool_name": "describe_nodes"}"#) {
            Decision::ToolCall(call) => assert_eq!(call.params, json!({})),
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_free_text_becomes_low_severity_finding() {
        assert_eq!(
            parse_decision("The error rate looks normal."),
            Decision::Final(FinalAnswer {
                findings: vec!["The error rate looks normal.".into()],
                severity: Severity::Low,
            })
        );
    }

    #[tokio::test]
    async fn test_prompt_lists_tools_and_protocol() {
        let provider = canned(Ok(r#"{"action": "final", "findings": [], "severity": "info"}"#));
        let inference = PromptedInference::new(provider.clone());
        let tools = vec![ToolDescriptor::new("count_errors", "Count errors per service")];

        let decision = inference.complete("Question: why?", &tools).await.unwrap();
        assert!(matches!(decision, Decision::Final(_)));

        let prompt = provider.prompts.lock()[0].clone();
        assert!(prompt.starts_with("Question: why?"));
        assert!(prompt.contains("- count_errors: Count errors per service (input schema: "));
        assert!(prompt.contains("\"action\": \"tool_call\""));
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let inference = PromptedInference::new(canned(Err(LLMError::Network("down".into()))));
        assert!(matches!(
            inference.complete("q", &[]).await,
            Err(LLMError::Network(_))
        ));
    }
}
