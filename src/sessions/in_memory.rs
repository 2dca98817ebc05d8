//! In-memory session store implementation.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{Session, SessionStore};

#[derive(Debug, Clone)]
struct StoredTurn {
    #[allow(dead_code)]
    question: String,
    #[allow(dead_code)]
    answer: String,
    #[allow(dead_code)]
    latency_ms: u64,
    #[allow(dead_code)]
    flagged: bool,
}

/// A session store backed by mutex-protected hash maps. Used in tests and
/// for ephemeral deployments that do not need sessions to survive a restart.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    turns: Mutex<HashMap<String, Vec<StoredTurn>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Number of turns persisted for a session (test observability).
    pub fn turn_count(&self, session_id: &str) -> usize {
        self.turns.lock().get(session_id).map_or(0, Vec::len)
    }

    /// Total number of sessions across all users (test observability).
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_by_id(&self, session_id: &str, user_id: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.lock();
        Ok(sessions
            .get(session_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn create(&self, user_id: &str, kb_key: &str, name: Option<&str>) -> Result<Session> {
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            knowledge_base_key: kb_key.to_string(),
            name: name.map(ToString::to_string),
            created_at: Utc::now(),
        };

        let mut sessions = self.sessions.lock();
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn save_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        latency_ms: u64,
        flagged: bool,
    ) -> Result<()> {
        if !self.sessions.lock().contains_key(session_id) {
            bail!("session not found: {session_id}");
        }
        let mut turns = self.turns.lock();
        turns
            .entry(session_id.to_string())
            .or_default()
            .push(StoredTurn {
                question: question.to_string(),
                answer: answer.to_string(),
                latency_ms,
                flagged,
            });
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let sessions = self.sessions.lock();
        let mut results: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    async fn delete(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock();
        let owned = sessions
            .get(session_id)
            .is_some_and(|s| s.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        sessions.remove(session_id);
        drop(sessions);

        let mut turns = self.turns.lock();
        turns.remove(session_id);
        Ok(true)
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_find_session() {
        let store = InMemorySessionStore::new();
        let created = store.create("alice", "unified_kb", None).await.unwrap();

        let found = store
            .find_by_id(&created.session_id, "alice")
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().knowledge_base_key, "unified_kb");
    }

    #[tokio::test]
    async fn find_is_scoped_to_user() {
        let store = InMemorySessionStore::new();
        let created = store.create("alice", "unified_kb", None).await.unwrap();

        let other = store.find_by_id(&created.session_id, "bob").await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn save_turn_requires_existing_session() {
        let store = InMemorySessionStore::new();
        let result = store.save_turn("missing", "q", "a", 10, false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn save_turn_accumulates() {
        let store = InMemorySessionStore::new();
        let session = store.create("alice", "unified_kb", None).await.unwrap();

        for i in 0..3 {
            store
                .save_turn(&session.session_id, &format!("q{i}"), "a", 5, false)
                .await
                .unwrap();
        }
        assert_eq!(store.turn_count(&session.session_id), 3);
    }

    #[tokio::test]
    async fn list_newest_first() {
        let store = InMemorySessionStore::new();
        store.create("alice", "unified_kb", Some("one")).await.unwrap();
        store.create("alice", "unified_kb", Some("two")).await.unwrap();
        store.create("bob", "unified_kb", None).await.unwrap();

        let sessions = store.list_for_user("alice").await.unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn delete_scoped_and_idempotent() {
        let store = InMemorySessionStore::new();
        let session = store.create("alice", "unified_kb", None).await.unwrap();
        store
            .save_turn(&session.session_id, "q", "a", 5, false)
            .await
            .unwrap();

        // Wrong user cannot delete
        assert!(!store.delete(&session.session_id, "bob").await.unwrap());
        assert!(store.delete(&session.session_id, "alice").await.unwrap());
        // Second delete is a no-op
        assert!(!store.delete(&session.session_id, "alice").await.unwrap());
        assert_eq!(store.turn_count(&session.session_id), 0);
    }
}
