// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool Gateway Clients
//!
//! Anti-corruption layer between workers and whatever actually executes tools.
//!
//! - [`HttpToolGateway`] forwards invocations to a remote gateway over HTTP.
//! - [`LocalToolGateway`] dispatches to in-process [`ToolHandler`]s; tools
//!   declared in configuration serve their `fixture` payload.
//!
//! Neither client enforces domain scoping; workers refuse out-of-scope calls
//! before they reach a gateway.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::config::{resolve_secret, DomainConfig, ToolGatewayConfig};
use crate::domain::tools::{ToolError, ToolGateway};

/// HTTP client for a remote tool gateway.
///
/// `POST {endpoint}/tools/{name}/invoke` with the params as the JSON body.
pub struct HttpToolGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpToolGateway {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn from_config(config: &ToolGatewayConfig) -> anyhow::Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Remote tool gateway requires an endpoint"))?;
        let api_key = config.api_key.as_deref().map(resolve_secret).transpose()?;
        Ok(Self::new(endpoint, api_key, config.request_timeout)?)
    }
}

/// Pull a readable message out of an error body, `{"error": "..."}` or plain text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("error") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}

#[async_trait]
impl ToolGateway for HttpToolGateway {
    async fn invoke(&self, tool_name: &str, params: Value) -> Result<Value, ToolError> {
        let url = format!(
            "{}/tools/{}/invoke",
            self.endpoint.trim_end_matches('/'),
            tool_name
        );

        let mut request = self.client.post(&url).json(&params);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Network(format!("request to {} timed out", url))
            } else {
                ToolError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(&response.text().await.unwrap_or_default());
            return Err(match status.as_u16() {
                400 | 422 => ToolError::InvalidParams(message),
                404 => ToolError::NotFound(tool_name.to_string()),
                _ => ToolError::Backend(format!("HTTP {}: {}", status, message)),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("Failed to parse response: {}", e)))?;

        // Some gateways report tool failures in-band with a 200.
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(ToolError::Backend(message));
        }

        debug!(tool_name, "Remote tool call succeeded");
        Ok(body)
    }
}

/// In-process tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Value) -> Result<Value, ToolError>;
}

/// Returns the same payload on every call.
pub struct StaticToolHandler {
    payload: Value,
}

impl StaticToolHandler {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl ToolHandler for StaticToolHandler {
    async fn call(&self, _params: Value) -> Result<Value, ToolError> {
        Ok(self.payload.clone())
    }
}

#[derive(Default, Clone)]
pub struct LocalToolGateway {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl LocalToolGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, tool_name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(tool_name.into(), handler);
        self
    }

    /// Register every configured tool. Tools without a fixture answer with a
    /// `no_data` status so workers can still reason about the call.
    pub fn from_domains(domains: &[DomainConfig]) -> Self {
        let mut gateway = Self::new();
        for domain in domains {
            for tool in &domain.tools {
                let payload = tool.fixture.clone().unwrap_or_else(|| {
                    json!({
                        "status": "no_data",
                        "tool": tool.name,
                        "domain": domain.name,
                    })
                });
                gateway
                    .handlers
                    .insert(tool.name.clone(), Arc::new(StaticToolHandler::new(payload)));
            }
        }
        gateway
    }

    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl ToolGateway for LocalToolGateway {
    async fn invoke(&self, tool_name: &str, params: Value) -> Result<Value, ToolError> {
        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;
        handler.call(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::DomainToolConfig;

    fn gateway_for(server: &mockito::ServerGuard) -> HttpToolGateway {
        HttpToolGateway::new(server.url(), Some("secret".to_string()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_http_invoke_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tools/query_metrics/invoke")
            .match_header("authorization", "Bearer secret")
            .match_body(mockito::Matcher::Json(json!({"metric": "p99_latency"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"p99_ms": 840, "baseline_ms": 280}"#)
            .create_async()
            .await;

        let result = gateway_for(&server)
            .invoke("query_metrics", json!({"metric": "p99_latency"}))
            .await
            .unwrap();
        assert_eq!(result["p99_ms"], 840);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tools/bad/invoke")
            .with_status(400)
            .with_body(r#"{"error": "metric is required"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/tools/missing/invoke")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("POST", "/tools/broken/invoke")
            .with_status(502)
            .with_body("upstream down")
            .create_async()
            .await;

        let gateway = gateway_for(&server);
        assert_eq!(
            gateway.invoke("bad", json!({})).await,
            Err(ToolError::InvalidParams("metric is required".to_string()))
        );
        assert_eq!(
            gateway.invoke("missing", json!({})).await,
            Err(ToolError::NotFound("missing".to_string()))
        );
        match gateway.invoke("broken", json!({})).await {
            Err(ToolError::Backend(message)) => assert!(message.contains("upstream down")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_in_band_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tools/search_logs/invoke")
            .with_status(200)
            .with_body(r#"{"error": "index unavailable"}"#)
            .create_async()
            .await;

        assert_eq!(
            gateway_for(&server).invoke("search_logs", json!({})).await,
            Err(ToolError::Backend("index unavailable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_http_unreachable_is_network_error() {
        let gateway = HttpToolGateway::new("http://127.0.0.1:1", None, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            gateway.invoke("query_metrics", json!({})).await,
            Err(ToolError::Network(_))
        ));
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        let config = ToolGatewayConfig::default();
        assert!(HttpToolGateway::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_local_gateway_serves_fixtures() {
        let domains = vec![DomainConfig {
            name: "metrics".to_string(),
            description: String::new(),
            keywords: vec![],
            tools: vec![
                DomainToolConfig {
                    name: "query_metrics".to_string(),
                    description: String::new(),
                    input_schema: None,
                    fixture: Some(json!({"p99_ms": 840})),
                },
                DomainToolConfig {
                    name: "compare_baseline".to_string(),
                    description: String::new(),
                    input_schema: None,
                    fixture: None,
                },
            ],
        }];

        let gateway = LocalToolGateway::from_domains(&domains);
        assert_eq!(gateway.tool_names(), vec!["compare_baseline", "query_metrics"]);
        assert_eq!(gateway.invoke("query_metrics", json!({})).await.unwrap()["p99_ms"], 840);
        assert_eq!(
            gateway.invoke("compare_baseline", json!({})).await.unwrap()["status"],
            "no_data"
        );
        assert_eq!(
            gateway.invoke("describe_nodes", json!({})).await,
            Err(ToolError::NotFound("describe_nodes".to_string()))
        );
    }
}
