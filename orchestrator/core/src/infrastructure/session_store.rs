// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Session Store
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Per-session append-only message logs backed by `DashMap`

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::domain::session::{Message, SessionError, SessionStore};

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, Vec<Message>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn check(session_id: &str) -> Result<(), SessionError> {
    if session_id.trim().is_empty() {
        return Err(SessionError::InvalidSession(session_id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: &str, message: Message) -> Result<(), SessionError> {
        check(session_id)?;
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Vec<Message>, SessionError> {
        check(session_id)?;
        Ok(self
            .sessions
            .get(session_id)
            .map(|messages| messages.clone())
            .unwrap_or_default())
    }
}
