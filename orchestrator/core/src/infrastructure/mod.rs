// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod llm;
pub mod memory_store;
pub mod session_store;
pub mod telemetry;
pub mod tool_gateway;

pub use event_bus::{EventBus, EventBusError, EventReceiver, InvestigationEventReceiver};
pub use memory_store::{scorer_from_config, InMemoryMemoryStore};
pub use session_store::InMemorySessionStore;
pub use telemetry::TracingSpanExporter;
pub use tool_gateway::{HttpToolGateway, LocalToolGateway, StaticToolHandler, ToolHandler};
