//! SQLite-backed session store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

use super::traits::{Session, SessionStore};

/// Durable session store backed by SQLite. Queries are short and run under
/// a single connection mutex; contention is bounded by one write per
/// completed turn.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {parent:?}"))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open session database {db_path:?}"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id  TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                kb_key      TEXT NOT NULL,
                name        TEXT,
                created_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE TABLE IF NOT EXISTS turns (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
                question    TEXT NOT NULL,
                answer      TEXT NOT NULL,
                latency_ms  INTEGER NOT NULL,
                flagged     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id);
            PRAGMA foreign_keys = ON;",
        )
        .context("Failed to initialize session schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
        let created_at: String = row.get(4)?;
        Ok(Session {
            session_id: row.get(0)?,
            user_id: row.get(1)?,
            knowledge_base_key: row.get(2)?,
            name: row.get(3)?,
            created_at: created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn find_by_id(&self, session_id: &str, user_id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, user_id, kb_key, name, created_at
             FROM sessions WHERE session_id = ?1 AND user_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![session_id, user_id], Self::row_to_session)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    async fn create(&self, user_id: &str, kb_key: &str, name: Option<&str>) -> Result<Session> {
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            knowledge_base_key: kb_key.to_string(),
            name: name.map(ToString::to_string),
            created_at: Utc::now(),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (session_id, user_id, kb_key, name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.session_id,
                session.user_id,
                session.knowledge_base_key,
                session.name,
                session.created_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert session")?;
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
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO turns (session_id, question, answer, latency_ms, flagged, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6
             WHERE EXISTS (SELECT 1 FROM sessions WHERE session_id = ?1)",
            params![
                session_id,
                question,
                answer,
                latency_ms as i64,
                i64::from(flagged),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if inserted == 0 {
            anyhow::bail!("session not found: {session_id}");
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, user_id, kb_key, name, created_at
             FROM sessions WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], Self::row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    async fn delete(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1 AND user_id = ?2",
            params![session_id, user_id],
        )?;
        if deleted > 0 {
            conn.execute("DELETE FROM turns WHERE session_id = ?1", params![session_id])?;
        }
        Ok(deleted > 0)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
