// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Vendor adapters translate between `LLMProvider` and external APIs. The
// prompted adapters build the domain's `ModelInference` and `PlanningModel`
// on top of any provider.

pub mod inference;
pub mod ollama;
pub mod openai;
pub mod planner;
pub mod registry;

pub use inference::PromptedInference;
pub use planner::LlmPlanner;
pub use registry::{AliasedProvider, ProviderRegistry};

/// Pull a JSON document out of model output. Models often wrap JSON in a
/// markdown block or surround it with prose. Objects and arrays are both
/// recognised; whichever opens first wins.
pub(crate) fn extract_json(text: &str) -> &str {
    for marker in ["```json", "```"] {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end_offset) = text[content_start..].find("```") {
                return text[content_start..content_start + end_offset].trim();
            }
        }
    }

    let (open, close) = match (text.find('{'), text.find('[')) {
        (Some(brace), Some(bracket)) if bracket < brace => ('[', ']'),
        (None, Some(_)) => ('[', ']'),
        _ => ('{', '}'),
    };
    match (text.find(open), text.rfind(close)) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}
