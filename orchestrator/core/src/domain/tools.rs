// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tools
//!
//! Static, domain-keyed tool registry and the gateway seam workers call through.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Tool allow-lists per domain and the `ToolGateway` interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::investigation::DomainName;

/// Tool metadata for discovery and prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: default_input_schema(),
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// The subset of tools one worker may call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolScope {
    pub domain: Option<DomainName>,
    pub tools: Vec<ToolDescriptor>,
}

impl ToolScope {
    pub fn allows(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t.name == tool_name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Resolved once at startup from configuration.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    by_domain: BTreeMap<DomainName, Vec<ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, domain: DomainName, tool: ToolDescriptor) {
        let tools = self.by_domain.entry(domain).or_default();
        if !tools.iter().any(|t| t.name == tool.name) {
            tools.push(tool);
        }
    }

    pub fn with_domain(mut self, domain: impl Into<DomainName>, tools: Vec<ToolDescriptor>) -> Self {
        let domain = domain.into();
        self.by_domain.entry(domain.clone()).or_default();
        for tool in tools {
            self.register(domain.clone(), tool);
        }
        self
    }

    /// Tools visible to `domain`. Unknown domains get an empty scope.
    pub fn scope_for(&self, domain: &DomainName) -> ToolScope {
        ToolScope {
            domain: Some(domain.clone()),
            tools: self.by_domain.get(domain).cloned().unwrap_or_default(),
        }
    }

    pub fn domains(&self) -> impl Iterator<Item = &DomainName> {
        self.by_domain.keys()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool '{tool_name}' is not permitted for domain '{domain}'")]
    NotPermitted { tool_name: String, domain: String },

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Tool backend error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Tool call timed out after {0}ms")]
    Timeout(u64),
}

/// Uniform façade over whatever executes tools.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    async fn invoke(&self, tool_name: &str, params: Value) -> Result<Value, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_is_filtered_by_domain() {
        let registry = ToolRegistry::new()
            .with_domain(
                "infra",
                vec![
                    ToolDescriptor::new("describe_nodes", "List cluster nodes"),
                    ToolDescriptor::new("describe_nodes", "duplicate"),
                ],
            )
            .with_domain("logs", vec![ToolDescriptor::new("search_logs", "Query logs")]);

        let infra = registry.scope_for(&DomainName::new("infra"));
        assert_eq!(infra.names(), vec!["describe_nodes"]);
        assert!(infra.allows("describe_nodes"));
        assert!(!infra.allows("search_logs"));

        let unknown = registry.scope_for(&DomainName::new("billing"));
        assert!(unknown.tools.is_empty());
        assert_eq!(registry.domains().count(), 2);
    }
}
