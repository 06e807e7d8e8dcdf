// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Investigation Use Case
//!
//! Application service that turns an [`InvestigatorConfig`] into a wired
//! [`Supervisor`] and exposes it to the presentation layer.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Compose collaborators, hand requests to the supervisor
//! - **Collaborators:**
//!   - Domain: Supervisor, WorkerAgent, KeywordRouter, ToolRegistry
//!   - Infrastructure: ProviderRegistry, tool gateways, memory/session stores, EventBus
//!
//! # Wiring
//!
//! 1. Build the LLM provider registry; planner and workers each bind an alias
//! 2. Pick the tool gateway (`local` fixtures or `remote` HTTP)
//! 3. One worker per configured domain, scoped to that domain's tools
//! 4. Events fan out to the event bus and the metrics exporter

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::domain::config::{InvestigatorConfig, ToolGatewayMode};
use crate::domain::events::{CompositeObserver, InvestigationObserver};
use crate::domain::investigation::{AggregatedReport, DomainName, InvestigationError, InvestigationRequest};
use crate::domain::llm::LLMError;
use crate::domain::memory::{MemoryError, MemoryStore, RecordId};
use crate::domain::routing::{DomainRoute, KeywordRouter};
use crate::domain::session::{Message, SessionError, SessionStore};
use crate::domain::supervisor::{Supervisor, SupervisorSettings};
use crate::domain::tools::{ToolGateway, ToolRegistry};
use crate::domain::worker::{WorkerAgent, WorkerSettings};
use crate::infrastructure::event_bus::{EventBus, EventReceiver};
use crate::infrastructure::llm::{AliasedProvider, LlmPlanner, PromptedInference, ProviderRegistry};
use crate::infrastructure::memory_store::{scorer_from_config, InMemoryMemoryStore};
use crate::infrastructure::session_store::InMemorySessionStore;
use crate::infrastructure::telemetry::TracingSpanExporter;
use crate::infrastructure::tool_gateway::{HttpToolGateway, LocalToolGateway};

#[async_trait]
pub trait InvestigationService: Send + Sync {
    /// Run one investigation and return the personalised report.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: empty query, bad user or session id
    /// - `PlanningUnavailable`: the planning model could not be reached
    async fn investigate(
        &self,
        request: InvestigationRequest,
    ) -> Result<AggregatedReport, InvestigationError>;

    async fn remember_preferences(
        &self,
        user_id: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<RecordId, MemoryError>;

    async fn conversation(&self, session_id: &str) -> Result<Vec<Message>, SessionError>;
}

pub struct StandardInvestigationService {
    supervisor: Arc<Supervisor>,
    event_bus: EventBus,
    providers: Option<Arc<ProviderRegistry>>,
}

impl StandardInvestigationService {
    pub fn new(supervisor: Arc<Supervisor>, event_bus: EventBus) -> Self {
        Self {
            supervisor,
            event_bus,
            providers: None,
        }
    }

    /// Wire the service with in-memory stores.
    pub fn from_config(config: &InvestigatorConfig) -> anyhow::Result<Self> {
        let memory = InMemoryMemoryStore::new()
            .with_scorer(scorer_from_config(&config.memory.scoring))
            .with_retention(config.memory.retention.clone());
        Self::from_config_with_stores(config, Arc::new(memory), Arc::new(InMemorySessionStore::new()))
    }

    pub fn from_config_with_stores(
        config: &InvestigatorConfig,
        memory: Arc<dyn MemoryStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        let providers = Arc::new(ProviderRegistry::from_config(config)?);
        let selection = &config.llm_selection;
        for alias in [&selection.planner_alias, &selection.worker_alias] {
            if !providers.has_alias(alias) {
                tracing::warn!("Model alias '{}' is not served by any enabled provider", alias);
            }
        }

        let planner = Arc::new(LlmPlanner::new(Arc::new(AliasedProvider::new(
            providers.clone(),
            selection.planner_alias.clone(),
        ))));
        let inference = Arc::new(PromptedInference::new(Arc::new(AliasedProvider::new(
            providers.clone(),
            selection.worker_alias.clone(),
        ))));

        let gateway: Arc<dyn ToolGateway> = match config.tool_gateway.mode {
            ToolGatewayMode::Local => Arc::new(LocalToolGateway::from_domains(&config.domains)),
            ToolGatewayMode::Remote => Arc::new(HttpToolGateway::from_config(&config.tool_gateway)?),
        };
        info!(mode = ?config.tool_gateway.mode, "Tool gateway configured");

        let event_bus = EventBus::with_default_capacity();
        let observer: Arc<dyn InvestigationObserver> = Arc::new(
            CompositeObserver::new()
                .with(Arc::new(event_bus.clone()))
                .with(Arc::new(TracingSpanExporter)),
        );

        let mut tools = ToolRegistry::new();
        let mut routes = Vec::with_capacity(config.domains.len());
        for domain in &config.domains {
            let name = DomainName::new(&domain.name);
            tools = tools.with_domain(
                name.clone(),
                domain.tools.iter().map(|t| t.descriptor()).collect(),
            );
            routes.push(DomainRoute {
                domain: name,
                description: domain.description.clone(),
                keywords: domain.keywords.clone(),
            });
        }

        let worker_settings = WorkerSettings {
            max_iterations: config.worker.max_iterations,
            tool_call_timeout: config.timeouts.tool_call,
        };
        let workers: Vec<Arc<WorkerAgent>> = routes
            .iter()
            .map(|route| {
                Arc::new(
                    WorkerAgent::new(
                        route.domain.clone(),
                        tools.scope_for(&route.domain),
                        inference.clone(),
                        gateway.clone(),
                    )
                    .with_observer(observer.clone())
                    .with_settings(worker_settings),
                )
            })
            .collect();

        let settings = SupervisorSettings {
            task_timeout: config.timeouts.task,
            request_timeout: config.timeouts.request,
            cancellation_grace: config.timeouts.cancellation_grace,
            memory_query_limit: config.memory.query_limit,
            memory_write_retry_delay: config.timeouts.memory_write_retry,
        };

        let supervisor = Supervisor::new(KeywordRouter::new(routes), planner, workers, memory, sessions)
            .with_observer(observer)
            .with_span_exporter(Arc::new(TracingSpanExporter))
            .with_settings(settings);

        info!(domains = config.domains.len(), "Investigation service ready");

        Ok(Self {
            supervisor: Arc::new(supervisor),
            event_bus,
            providers: Some(providers),
        })
    }

    /// Stream progress events for every investigation run by this service.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn domains(&self) -> Vec<DomainName> {
        self.supervisor.domains()
    }

    /// Health of each configured LLM provider, keyed by provider name.
    pub async fn provider_health(&self) -> HashMap<String, Result<(), LLMError>> {
        match &self.providers {
            Some(providers) => providers.health_check_all().await,
            None => HashMap::new(),
        }
    }
}

#[async_trait]
impl InvestigationService for StandardInvestigationService {
    async fn investigate(
        &self,
        request: InvestigationRequest,
    ) -> Result<AggregatedReport, InvestigationError> {
        self.supervisor.handle(request).await
    }

    async fn remember_preferences(
        &self,
        user_id: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<RecordId, MemoryError> {
        self.supervisor.remember_preferences(user_id, attributes).await
    }

    async fn conversation(&self, session_id: &str) -> Result<Vec<Message>, SessionError> {
        self.supervisor.conversation(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config_wires_every_domain() {
        let service = StandardInvestigationService::from_config(&InvestigatorConfig::default()).unwrap();
        let domains: Vec<String> = service.domains().iter().map(|d| d.to_string()).collect();
        assert_eq!(domains, vec!["infra", "logs", "metrics", "runbooks"]);
    }

    #[test]
    fn test_remote_gateway_requires_endpoint() {
        let mut config = InvestigatorConfig::default();
        config.tool_gateway.mode = ToolGatewayMode::Remote;
        config.tool_gateway.endpoint = None;
        assert!(StandardInvestigationService::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_planning() {
        let service = StandardInvestigationService::from_config(&InvestigatorConfig::default()).unwrap();
        let result = service
            .investigate(InvestigationRequest::new("   ", "alice", ""))
            .await;
        assert!(matches!(result, Err(InvestigationError::InvalidRequest(_))));
    }
}
