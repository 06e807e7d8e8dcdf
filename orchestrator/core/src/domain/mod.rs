// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Investigation model, collaborator seams and the supervisor/worker services.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure investigation logic; I/O lives behind traits

pub mod config;
pub mod events;
pub mod investigation;
pub mod llm;
pub mod memory;
pub mod preferences;
pub mod report;
pub mod routing;
pub mod session;
pub mod supervisor;
pub mod telemetry;
pub mod tools;
pub mod worker;
