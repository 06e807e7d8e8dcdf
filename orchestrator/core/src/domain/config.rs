// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Investigator Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - Investigation domains, their routing keywords and tool allow-lists
// - LLM providers and model aliases for the planner and workers
// - Tool gateway mode (local in-process handlers or remote HTTP gateway)
// - Timeouts, iteration budget and memory retention/scoring

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::investigation::{DomainName, MAX_PLAN_STEPS};
use crate::domain::memory::MemoryRetention;
use crate::domain::tools::ToolDescriptor;

pub const API_VERSION: &str = "triage.dev/v1";
pub const KIND: &str = "InvestigatorConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigatorConfigManifest {
    /// API version (must be "triage.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "InvestigatorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: InvestigatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Content under `spec:`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigatorConfig {
    /// Specialist domains, in routing order
    #[serde(default = "default_domains")]
    pub domains: Vec<DomainConfig>,

    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    #[serde(default)]
    pub llm_selection: LLMSelection,

    #[serde(default)]
    pub tool_gateway: ToolGatewayConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Whole-word keywords or phrases that route a query to this domain
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Tool allow-list for this domain's worker
    #[serde(default)]
    pub tools: Vec<DomainToolConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainToolConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,

    /// Canned response served by the local gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<serde_json::Value>,
}

impl DomainToolConfig {
    pub fn descriptor(&self) -> ToolDescriptor {
        let descriptor = ToolDescriptor::new(self.name.clone(), self.description.clone());
        match &self.input_schema {
            Some(schema) => descriptor.with_input_schema(schema.clone()),
            None => descriptor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local", "openai")
    pub name: String,

    /// "openai", "openai-compatible" or "ollama"
    #[serde(rename = "type")]
    pub provider_type: String,

    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alias referenced by `llm_selection` (e.g., "default", "planner")
    pub alias: String,

    /// Actual model identifier for the provider API
    pub model: String,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default = "default_context_window")]
    pub context_window: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMSelection {
    /// Model alias used for planning calls
    #[serde(default = "default_alias")]
    pub planner_alias: String,

    /// Model alias used by worker reasoning loops
    #[serde(default = "default_alias")]
    pub worker_alias: String,

    /// Fallback provider if primary fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds (doubles per attempt)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolGatewayMode {
    /// In-process handlers
    #[default]
    Local,
    /// HTTP tool gateway
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolGatewayConfig {
    #[serde(default)]
    pub mode: ToolGatewayMode,

    /// Base URL, required in remote mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Bearer token (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(with = "humantime_serde", default = "default_gateway_timeout")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per-worker deadline
    #[serde(with = "humantime_serde", default = "default_task_timeout")]
    pub task: Duration,

    /// Whole-request deadline; still-running workers are cancelled
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request: Duration,

    /// Per tool call, inside a worker
    #[serde(with = "humantime_serde", default = "default_tool_call_timeout")]
    pub tool_call: Duration,

    /// How long cancelled workers get to hand back partial findings
    #[serde(with = "humantime_serde", default = "default_cancellation_grace")]
    pub cancellation_grace: Duration,

    /// Delay before the single memory write retry
    #[serde(with = "humantime_serde", default = "default_memory_write_retry")]
    pub memory_write_retry: Duration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Max history/knowledge records loaded per request
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,

    #[serde(default)]
    pub retention: MemoryRetention,

    #[serde(default)]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringStrategy {
    Recency,
    Lexical,
    #[default]
    Blended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub strategy: ScoringStrategy,

    #[serde(default = "default_decay_per_day")]
    pub recency_decay_per_day: f64,

    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("compact" or "json")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_alias() -> String {
    "default".to_string()
}

fn default_context_window() -> u32 {
    8192
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_gateway_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_tool_call_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_cancellation_grace() -> Duration {
    Duration::from_secs(2)
}

fn default_memory_write_retry() -> Duration {
    Duration::from_millis(250)
}

fn default_max_iterations() -> u32 {
    6
}

fn default_query_limit() -> usize {
    5
}

fn default_decay_per_day() -> f64 {
    0.01
}

fn default_recency_weight() -> f64 {
    0.3
}

fn default_relevance_weight() -> f64 {
    0.7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn tool(name: &str, description: &str) -> DomainToolConfig {
    DomainToolConfig {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: None,
        fixture: None,
    }
}

fn domain(name: &str, description: &str, keywords: &[&str], tools: Vec<DomainToolConfig>) -> DomainConfig {
    DomainConfig {
        name: name.to_string(),
        description: description.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        tools,
    }
}

pub fn default_domains() -> Vec<DomainConfig> {
    vec![
        domain(
            "infra",
            "Hosts, clusters, containers and capacity",
            &["node", "host", "server", "cpu", "memory", "disk", "pod", "container", "cluster", "kubernetes", "deployment", "capacity", "instance"],
            vec![
                tool("describe_nodes", "List cluster nodes with health and resource pressure"),
                tool("get_resource_usage", "CPU, memory and disk usage for a host or pod"),
                tool("list_recent_deployments", "Deployments rolled out in the last 24 hours"),
            ],
        ),
        domain(
            "logs",
            "Application and system logs",
            &["log", "error", "exception", "stack trace", "crash", "panic", "500", "5xx", "timeout"],
            vec![
                tool("search_logs", "Full-text search over application logs"),
                tool("count_errors", "Error counts grouped by service and status"),
            ],
        ),
        domain(
            "metrics",
            "Time-series metrics, latency and throughput",
            &["latency", "response time", "throughput", "slow", "degraded", "p99", "p95", "spike", "metric", "rate", "saturation"],
            vec![
                tool("query_metrics", "Run a metrics query over a time range"),
                tool("compare_baseline", "Compare a metric against its weekly baseline"),
            ],
        ),
        domain(
            "runbooks",
            "Operational runbooks and known remediations",
            &["runbook", "playbook", "procedure", "remediation", "mitigate", "rollback", "how to"],
            vec![tool("search_runbooks", "Find runbooks matching a symptom")],
        ),
    ]
}

impl Default for LLMSelection {
    fn default() -> Self {
        Self {
            planner_alias: default_alias(),
            worker_alias: default_alias(),
            fallback_provider: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl Default for ToolGatewayConfig {
    fn default() -> Self {
        Self {
            mode: ToolGatewayMode::Local,
            endpoint: None,
            api_key: None,
            request_timeout: default_gateway_timeout(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            task: default_task_timeout(),
            request: default_request_timeout(),
            tool_call: default_tool_call_timeout(),
            cancellation_grace: default_cancellation_grace(),
            memory_write_retry: default_memory_write_retry(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            query_limit: default_query_limit(),
            retention: MemoryRetention::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            strategy: ScoringStrategy::Blended,
            recency_decay_per_day: default_decay_per_day(),
            recency_weight: default_recency_weight(),
            relevance_weight: default_relevance_weight(),
        }
    }
}

impl Default for InvestigatorConfig {
    fn default() -> Self {
        Self {
            domains: default_domains(),
            llm_providers: vec![LLMProviderConfig {
                name: "ollama-local".to_string(),
                provider_type: "ollama".to_string(),
                endpoint: "http://localhost:11434".to_string(),
                api_key: None,
                enabled: true,
                models: vec![ModelConfig {
                    alias: default_alias(),
                    model: "llama3.2".to_string(),
                    capabilities: vec!["chat".to_string()],
                    context_window: default_context_window(),
                }],
            }],
            llm_selection: LLMSelection::default(),
            tool_gateway: ToolGatewayConfig::default(),
            timeouts: TimeoutConfig::default(),
            worker: WorkerConfig::default(),
            memory: MemoryConfig::default(),
            observability: None,
        }
    }
}

impl Default for InvestigatorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "triage".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: InvestigatorConfig::default(),
        }
    }
}

/// Resolve a secret reference. `env:VAR_NAME` reads the variable; anything
/// else is taken literally.
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
        None => Ok(value.to_string()),
    }
}

impl InvestigatorConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. TRIAGE_CONFIG_PATH environment variable
    /// 2. ./triage-config.yaml (working directory)
    /// 3. ~/.triage/config.yaml (user home)
    /// 4. /etc/triage/config.yaml (system, Unix) or C:\ProgramData\Triage\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TRIAGE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./triage-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".triage").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/triage/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Triage\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails hard if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(&config_path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", config_path, e)
            })?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using built-in defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// injectable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let timeouts = &mut self.spec.timeouts;
        for (key, slot) in [
            ("TRIAGE_TASK_TIMEOUT", &mut timeouts.task),
            ("TRIAGE_REQUEST_TIMEOUT", &mut timeouts.request),
        ] {
            if let Some(val) = lookup(key) {
                match humantime::parse_duration(&val) {
                    Ok(duration) => {
                        tracing::info!("Environment override: {}={}", key, val);
                        *slot = duration;
                    }
                    Err(e) => tracing::warn!(
                        "Invalid value for {}: '{}' ({}). Expected a duration like '30s'. Ignoring.",
                        key,
                        val,
                        e
                    ),
                }
            }
        }

        if let Some(val) = lookup("TRIAGE_MAX_ITERATIONS") {
            match val.parse::<u32>() {
                Ok(n) => {
                    tracing::info!("Environment override: TRIAGE_MAX_ITERATIONS={}", n);
                    self.spec.worker.max_iterations = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for TRIAGE_MAX_ITERATIONS: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("TRIAGE_TOOL_GATEWAY_ENDPOINT") {
            tracing::info!("Environment override: TRIAGE_TOOL_GATEWAY_ENDPOINT={}", val);
            self.spec.tool_gateway.endpoint = Some(val);
            self.spec.tool_gateway.mode = ToolGatewayMode::Remote;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;

        if spec.domains.is_empty() {
            anyhow::bail!("spec.domains must contain at least one domain");
        }
        if spec.domains.len() > MAX_PLAN_STEPS {
            anyhow::bail!(
                "spec.domains supports at most {} domains, found {}",
                MAX_PLAN_STEPS,
                spec.domains.len()
            );
        }
        let mut seen: Vec<DomainName> = Vec::new();
        for domain in &spec.domains {
            let name = DomainName::new(&domain.name);
            if name.as_str().is_empty() {
                anyhow::bail!("Domain name cannot be empty");
            }
            if !crate::domain::memory::Namespace::is_valid_segment(name.as_str()) {
                anyhow::bail!("Domain name '{}' contains unsupported characters", domain.name);
            }
            if crate::domain::memory::is_reserved_domain(name.as_str()) {
                anyhow::bail!("Domain name '{}' is reserved for memory records", name);
            }
            if seen.contains(&name) {
                anyhow::bail!("Duplicate domain: '{}'", name);
            }
            for tool in &domain.tools {
                if tool.name.is_empty() {
                    anyhow::bail!("Tool name cannot be empty in domain: {}", domain.name);
                }
            }
            seen.push(name);
        }

        for provider in &spec.llm_providers {
            if provider.name.is_empty() {
                anyhow::bail!("LLM provider name cannot be empty");
            }
            if provider.endpoint.is_empty() {
                anyhow::bail!("LLM provider endpoint cannot be empty for: {}", provider.name);
            }
            if provider.models.is_empty() {
                anyhow::bail!("LLM provider must have at least one model: {}", provider.name);
            }
            for model in &provider.models {
                if model.alias.is_empty() {
                    anyhow::bail!("Model alias cannot be empty in provider: {}", provider.name);
                }
                if model.model.is_empty() {
                    anyhow::bail!("Model identifier cannot be empty for alias: {}", model.alias);
                }
            }
        }

        let has_alias = |alias: &str| {
            spec.llm_providers
                .iter()
                .filter(|p| p.enabled)
                .any(|p| p.models.iter().any(|m| m.alias == alias))
        };
        for (field, alias) in [
            ("planner_alias", &spec.llm_selection.planner_alias),
            ("worker_alias", &spec.llm_selection.worker_alias),
        ] {
            if !has_alias(alias) {
                anyhow::bail!(
                    "llm_selection.{} '{}' is not provided by any enabled llm_provider",
                    field,
                    alias
                );
            }
        }

        if let Some(fallback_provider) = &spec.llm_selection.fallback_provider {
            if !spec.llm_providers.iter().any(|p| &p.name == fallback_provider) {
                anyhow::bail!("Fallback provider '{}' not found in llm_providers", fallback_provider);
            }
        }

        let t = &spec.timeouts;
        for (field, value) in [
            ("task", t.task),
            ("request", t.request),
            ("tool_call", t.tool_call),
            ("cancellation_grace", t.cancellation_grace),
        ] {
            if value.is_zero() {
                anyhow::bail!("timeouts.{} must be greater than zero", field);
            }
        }
        if t.task > t.request {
            anyhow::bail!(
                "timeouts.task ({:?}) cannot exceed timeouts.request ({:?})",
                t.task,
                t.request
            );
        }

        if spec.worker.max_iterations == 0 {
            anyhow::bail!("worker.max_iterations must be at least 1");
        }

        if spec.memory.query_limit == 0 {
            anyhow::bail!("memory.query_limit must be at least 1");
        }

        if spec.tool_gateway.mode == ToolGatewayMode::Remote
            && spec.tool_gateway.endpoint.as_deref().map(str::is_empty).unwrap_or(true)
        {
            anyhow::bail!("tool_gateway.endpoint is required in remote mode");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_manifest() {
        let manifest = InvestigatorConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        let names: Vec<&str> = manifest.spec.domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["infra", "logs", "metrics", "runbooks"]);
        assert_eq!(manifest.spec.timeouts.task, Duration::from_secs(30));
        assert_eq!(manifest.spec.timeouts.request, Duration::from_secs(120));
        assert_eq!(manifest.spec.worker.max_iterations, 6);
        assert_eq!(manifest.spec.memory.query_limit, 5);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: triage.dev/v1
kind: InvestigatorConfig
metadata:
  name: test
spec:
  llm_providers:
    - name: local
      type: ollama
      endpoint: http://localhost:11434
      models:
        - alias: default
          model: llama3.2
  timeouts:
    task: 5s
    request: 1m
"#;
        let manifest = InvestigatorConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.domains.len(), 4);
        assert_eq!(manifest.spec.timeouts.task, Duration::from_secs(5));
        assert_eq!(manifest.spec.timeouts.request, Duration::from_secs(60));
        assert_eq!(manifest.spec.timeouts.cancellation_grace, Duration::from_secs(2));
        assert_eq!(manifest.spec.timeouts.memory_write_retry, Duration::from_millis(250));
        assert_eq!(manifest.spec.memory.scoring.strategy, ScoringStrategy::Blended);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = InvestigatorConfigManifest::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("TRIAGE_TASK_TIMEOUT", "45s"),
            ("TRIAGE_REQUEST_TIMEOUT", "not-a-duration"),
            ("TRIAGE_MAX_ITERATIONS", "9"),
            ("TRIAGE_TOOL_GATEWAY_ENDPOINT", "http://gateway:8080"),
        ]);
        manifest.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(manifest.spec.timeouts.task, Duration::from_secs(45));
        assert_eq!(manifest.spec.timeouts.request, Duration::from_secs(120));
        assert_eq!(manifest.spec.worker.max_iterations, 9);
        assert_eq!(manifest.spec.tool_gateway.mode, ToolGatewayMode::Remote);
        assert_eq!(manifest.spec.tool_gateway.endpoint.as_deref(), Some("http://gateway:8080"));
    }

    #[test]
    fn test_validation() {
        let mut manifest = InvestigatorConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        let original_domains = manifest.spec.domains.clone();
        manifest.spec.domains.push(manifest.spec.domains[0].clone());
        assert!(manifest.validate().is_err(), "duplicate domain");
        manifest.spec.domains = original_domains.clone();
        manifest.spec.domains.clear();
        assert!(manifest.validate().is_err(), "no domains");
        manifest.spec.domains = original_domains;

        manifest.spec.timeouts.task = Duration::from_secs(300);
        assert!(manifest.validate().is_err(), "task exceeds request");
        manifest.spec.timeouts.task = Duration::from_secs(30);

        manifest.spec.worker.max_iterations = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.worker.max_iterations = 6;

        manifest.spec.llm_selection.planner_alias = "missing".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.llm_selection.planner_alias = "default".to_string();

        manifest.spec.tool_gateway.mode = ToolGatewayMode::Remote;
        assert!(manifest.validate().is_err(), "remote without endpoint");
        manifest.spec.tool_gateway.endpoint = Some("http://gateway".to_string());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_reserved_domain_names_rejected() {
        for reserved in ["preferences", "Investigations"] {
            let mut manifest = InvestigatorConfigManifest::default();
            manifest.spec.domains[0].name = reserved.to_string();
            let err = manifest.validate().unwrap_err();
            assert!(err.to_string().contains("reserved"), "{}", err);
        }
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage-config.yaml");
        let manifest = InvestigatorConfigManifest::default();
        manifest.to_yaml_file(&path).unwrap();

        let loaded = InvestigatorConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.domains.len(), 4);
        assert_eq!(loaded.spec.timeouts.tool_call, Duration::from_secs(10));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = InvestigatorConfigManifest::load_or_default(Some(dir.path().join("nope.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret("literal-key").unwrap(), "literal-key");
        assert!(resolve_secret("env:TRIAGE_TEST_SECRET_THAT_IS_NOT_SET").is_err());
        std::env::set_var("TRIAGE_TEST_SECRET_SET", "from-env");
        assert_eq!(resolve_secret("env:TRIAGE_TEST_SECRET_SET").unwrap(), "from-env");
    }
}
