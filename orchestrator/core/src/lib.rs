// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Triage Orchestrator Core
//!
//! Supervisor-coordinated, multi-agent incident investigation: a supervisor
//! plans an investigation over specialist domains, fans the work out to
//! tool-using worker agents, and merges their findings into one report
//! personalised from long-lived memory.
//!
//! # Architecture
//!
//! - **domain**: investigation model, supervisor, workers, collaborator traits
//! - **application**: configuration-driven wiring
//! - **infrastructure**: LLM adapters, tool gateways, stores, event bus

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
