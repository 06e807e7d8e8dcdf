// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Model-facing seams used by workers and the planner.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption layer between investigation logic and model vendors

// Two levels of abstraction live here:
//
// - `LLMProvider` is raw text generation, implemented per vendor in
//   infrastructure/llm/.
// - `ModelInference` and `PlanningModel` are what the domain actually needs:
//   a structured reasoning decision and a list of proposed plan steps.
//   Adapters in infrastructure/llm/ build them on top of any `LLMProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::investigation::{DomainName, InvestigationRequest, PlanStep, Severity};
use crate::domain::tools::ToolDescriptor;

/// Domain interface for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError>;

    /// Check if provider is healthy and accessible
    async fn health_check(&self) -> Result<(), LLMError>;
}

/// Options for LLM generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,

    /// Sequences that stop generation
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(1024),
            temperature: Some(0.2),
            stop_sequences: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: TokenUsage,
    /// Provider name (e.g., "openai", "ollama")
    pub provider: String,
    pub model: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LLMError {
    /// True when the collaborator could not be reached or refused to serve
    /// the request at all, as opposed to returning something unusable.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Authentication(_)
                | Self::RateLimit
                | Self::ModelNotFound(_)
                | Self::Provider(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub findings: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    #[serde(default)]
    pub params: Value,
}

/// What the model wants to do next in a worker's reasoning loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Final(FinalAnswer),
    ToolCall(ToolCallRequest),
}

/// One reasoning step for a worker.
#[async_trait]
pub trait ModelInference: Send + Sync {
    async fn complete(&self, prompt: &str, tools: &[ToolDescriptor]) -> Result<Decision, LLMError>;
}

/// A domain the planner may choose from.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCandidate {
    pub domain: DomainName,
    pub description: String,
}

/// Context gathered before planning.
#[derive(Debug, Clone, Default)]
pub struct PlanningContext {
    /// Domains already selected by keyword classification.
    pub keyword_domains: Vec<DomainName>,
    /// Summaries of relevant past investigations and domain knowledge.
    pub memories: Vec<String>,
    /// Number of messages already in the session.
    pub session_turns: usize,
    /// The last few session messages, oldest first.
    pub recent_turns: Vec<String>,
}

/// Model-backed planning call.
///
/// Return `Err` only when the collaborator is unreachable. A reply that cannot
/// be interpreted should come back as `Ok(vec![])`.
#[async_trait]
pub trait PlanningModel: Send + Sync {
    async fn propose(
        &self,
        request: &InvestigationRequest,
        candidates: &[PlanCandidate],
        context: &PlanningContext,
    ) -> Result<Vec<PlanStep>, LLMError>;
}
