// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Model Alias Resolution and Provider Management
//
// Each configured model alias gets its own adapter instance. Generation goes
// through the alias with retries, exponential backoff and an optional
// fallback provider.

use crate::domain::config::{resolve_secret, InvestigatorConfig, LLMProviderConfig, ModelConfig};
use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

struct AliasEntry {
    provider_name: String,
    provider: Arc<dyn LLMProvider>,
}

/// Registry for managing LLM providers and resolving model aliases
pub struct ProviderRegistry {
    aliases: HashMap<String, AliasEntry>,
    /// provider name -> adapter for that provider's first model
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    fallback_provider: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
            providers: HashMap::new(),
            fallback_provider: None,
            max_retries: 1,
            retry_delay: Duration::ZERO,
        }
    }

    /// Providers that fail to initialize are skipped with a warning.
    pub fn from_config(config: &InvestigatorConfig) -> anyhow::Result<Self> {
        let mut registry = Self::empty();
        registry.fallback_provider = config.llm_selection.fallback_provider.clone();
        registry.max_retries = config.llm_selection.max_retries.max(1);
        registry.retry_delay = Duration::from_millis(config.llm_selection.retry_delay_ms);

        info!("Initializing LLM provider registry");

        for provider_config in &config.llm_providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }

            let api_key = match provider_config.api_key.as_deref().map(resolve_secret).transpose() {
                Ok(key) => key.unwrap_or_default(),
                Err(e) => {
                    warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
                    continue;
                }
            };

            for model_config in &provider_config.models {
                match Self::create_provider(provider_config, model_config, &api_key) {
                    Ok(provider) => {
                        info!(
                            "Mapping alias '{}' -> {} ({})",
                            model_config.alias, model_config.model, provider_config.name
                        );
                        registry.insert(&provider_config.name, &model_config.alias, provider);
                    }
                    Err(e) => {
                        warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
                    }
                }
            }
        }

        if registry.aliases.is_empty() {
            warn!("No LLM providers configured - planning and worker reasoning will be unavailable");
        }

        Ok(registry)
    }

    fn create_provider(
        config: &LLMProviderConfig,
        model: &ModelConfig,
        api_key: &str,
    ) -> anyhow::Result<Arc<dyn LLMProvider>> {
        let provider: Arc<dyn LLMProvider> = match config.provider_type.as_str() {
            "openai" | "openai-compatible" => Arc::new(
                OpenAIAdapter::new(config.endpoint.clone(), api_key.to_string(), model.model.clone())
                    .with_provider_name(config.name.clone()),
            ),
            "ollama" => Arc::new(
                OllamaAdapter::new(config.endpoint.clone(), model.model.clone())
                    .with_provider_name(config.name.clone()),
            ),
            _ => anyhow::bail!("Unsupported provider type: {}", config.provider_type),
        };
        Ok(provider)
    }

    /// Register an adapter under an alias. The first alias registered for a
    /// provider also serves as that provider's fallback adapter.
    pub fn insert(&mut self, provider_name: &str, alias: &str, provider: Arc<dyn LLMProvider>) {
        self.providers
            .entry(provider_name.to_string())
            .or_insert_with(|| provider.clone());
        self.aliases.insert(
            alias.to_string(),
            AliasEntry {
                provider_name: provider_name.to_string(),
                provider,
            },
        );
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_fallback_provider(mut self, provider_name: impl Into<String>) -> Self {
        self.fallback_provider = Some(provider_name.into());
        self
    }

    /// Generate text using a model alias, with retries and fallback.
    pub async fn generate(
        &self,
        alias: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let entry = self
            .aliases
            .get(alias)
            .ok_or_else(|| LLMError::ModelNotFound(format!("Model alias '{}' not found", alias)))?;

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match entry.provider.generate(prompt, options).await {
                Ok(response) => {
                    debug!(alias, attempt = attempt + 1, "Generation successful");
                    return Ok(response);
                }
                // Retrying cannot fix the input.
                Err(e @ LLMError::InvalidInput(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "Generation failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    last_error = Some(e);

                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(self.retry_delay * 2_u32.pow(attempt)).await;
                    }
                }
            }
        }

        if let Some(fallback) = &self.fallback_provider {
            if fallback != &entry.provider_name {
                if let Some(fallback_provider) = self.providers.get(fallback) {
                    info!("Trying fallback provider: {}", fallback);
                    return fallback_provider.generate(prompt, options).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Provider("Unknown error".into())))
    }

    /// Check health of all providers
    pub async fn health_check_all(&self) -> HashMap<String, Result<(), LLMError>> {
        let mut results = HashMap::new();
        for (name, provider) in &self.providers {
            info!("Health checking provider: {}", name);
            results.insert(name.clone(), provider.health_check().await);
        }
        results
    }

    pub fn available_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.aliases.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }
}

/// An [`LLMProvider`] bound to one alias of a shared registry.
pub struct AliasedProvider {
    registry: Arc<ProviderRegistry>,
    alias: String,
}

impl AliasedProvider {
    pub fn new(registry: Arc<ProviderRegistry>, alias: impl Into<String>) -> Self {
        Self {
            registry,
            alias: alias.into(),
        }
    }
}

#[async_trait]
impl LLMProvider for AliasedProvider {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        self.registry.generate(&self.alias, prompt, options).await
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let entry = self
            .registry
            .aliases
            .get(&self.alias)
            .ok_or_else(|| LLMError::ModelNotFound(format!("Model alias '{}' not found", self.alias)))?;
        entry.provider.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{FinishReason, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
        name: &'static str,
    }

    impl FlakyProvider {
        fn new(name: &'static str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures_left: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                name,
            })
        }
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(LLMError::Network("connection refused".into()));
            }
            Ok(GenerationResponse {
                text: "ok".into(),
                usage: TokenUsage::default(),
                provider: self.name.into(),
                model: "m".into(),
                finish_reason: FinishReason::Stop,
            })
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_creation() {
        let config = InvestigatorConfig::default();
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.has_alias("default"));
        assert_eq!(registry.available_aliases(), vec!["default".to_string()]);
    }

    #[test]
    fn test_unsupported_and_disabled_providers_are_skipped() {
        let mut config = InvestigatorConfig::default();
        config.llm_providers[0].provider_type = "carrier-pigeon".to_string();
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(!registry.has_alias("default"));

        let mut config = InvestigatorConfig::default();
        config.llm_providers[0].enabled = false;
        assert!(ProviderRegistry::from_config(&config).unwrap().available_aliases().is_empty());
    }

    #[test]
    fn test_missing_env_key_skips_provider() {
        let mut config = InvestigatorConfig::default();
        config.llm_providers[0].api_key = Some("env:TRIAGE_TEST_KEY_THAT_IS_NOT_SET".to_string());
        assert!(!ProviderRegistry::from_config(&config).unwrap().has_alias("default"));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let flaky = FlakyProvider::new("primary", 2);
        let mut registry = ProviderRegistry::empty().with_retry_policy(3, Duration::from_millis(1));
        registry.insert("primary", "default", flaky.clone());

        let response = registry
            .generate("default", "hi", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_falls_back_after_exhausting_retries() {
        let primary = FlakyProvider::new("primary", 10);
        let backup = FlakyProvider::new("backup", 0);
        let mut registry = ProviderRegistry::empty()
            .with_retry_policy(2, Duration::from_millis(1))
            .with_fallback_provider("backup");
        registry.insert("primary", "default", primary.clone());
        registry.insert("backup", "cheap", backup.clone());

        let response = registry
            .generate("default", "hi", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(response.provider, "backup");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_alias() {
        let registry = Arc::new(ProviderRegistry::empty());
        let provider = AliasedProvider::new(registry, "planner");
        assert!(matches!(
            provider.generate("hi", &GenerationOptions::default()).await,
            Err(LLMError::ModelNotFound(_))
        ));
    }
}
