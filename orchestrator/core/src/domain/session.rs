// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session
//!
//! Append-only conversation log keyed by session id.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Conversation state shared across turns of one session

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid session id: {0:?}")]
    InvalidSession(String),

    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Messages are only ever appended; there is no edit or delete.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, session_id: &str, message: Message) -> Result<(), SessionError>;

    /// Full ordered history. Unknown sessions are empty.
    async fn load(&self, session_id: &str) -> Result<Vec<Message>, SessionError>;
}
