//! Session storage traits and types for chat conversation state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat session owned by one user against one knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub knowledge_base_key: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistent storage for chat sessions and their completed turns.
///
/// Lookups are always scoped to a user: a session id belonging to another
/// user resolves to `None`, never to an error.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get a session by id, scoped to the owning user.
    async fn find_by_id(&self, session_id: &str, user_id: &str) -> Result<Option<Session>>;

    /// Create a new session for a user against the given knowledge-base key.
    async fn create(&self, user_id: &str, kb_key: &str, name: Option<&str>) -> Result<Session>;

    /// Persist one completed question/answer turn.
    async fn save_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        latency_ms: u64,
        flagged: bool,
    ) -> Result<()>;

    /// List sessions belonging to a user, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Delete a session and its stored turns. Returns whether it existed.
    async fn delete(&self, session_id: &str, user_id: &str) -> Result<bool>;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}
