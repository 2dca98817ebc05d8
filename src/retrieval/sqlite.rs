//! SQLite-backed keyword knowledge base.
//!
//! Chunks are ranked by the number of distinct query terms they contain.
//! Deliberately simple: no embeddings, no external services, good enough
//! for modest documentation corpora.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

use super::traits::{KnowledgeBaseStatus, Retrieval};

const MAX_QUERY_TERMS: usize = 8;

pub struct SqliteKnowledgeBase {
    conn: Mutex<Connection>,
}

impl SqliteKnowledgeBase {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {parent:?}"))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open knowledge base {db_path:?}"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                document    TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document);",
        )
        .context("Failed to initialize knowledge base schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store chunks under a document name. Returns the number stored.
    pub fn ingest(&self, document: &str, chunks: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut stored = 0;
        for chunk in chunks {
            let trimmed = chunk.trim();
            if trimmed.is_empty() {
                continue;
            }
            tx.execute(
                "INSERT INTO chunks (document, content, created_at) VALUES (?1, ?2, ?3)",
                params![document, trimmed, now],
            )?;
            stored += 1;
        }
        tx.commit()?;
        Ok(stored)
    }

    /// Remove all chunks belonging to a document. Returns the number removed.
    pub fn remove_document(&self, document: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM chunks WHERE document = ?1", params![document])?;
        Ok(removed)
    }
}

/// Lowercased alphanumeric terms of length >= 2, capped at `MAX_QUERY_TERMS`.
fn query_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(ToString::to_string)
        .collect();
    terms.dedup();
    terms.truncate(MAX_QUERY_TERMS);
    terms
}

fn score(content: &str, terms: &[String]) -> usize {
    let lowered = content.to_lowercase();
    terms.iter().filter(|t| lowered.contains(t.as_str())).count()
}

#[async_trait]
impl Retrieval for SqliteKnowledgeBase {
    async fn search(&self, question: &str, top_k: usize) -> Result<Vec<String>> {
        let terms = query_terms(question);
        if terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        // Candidate filter in SQL, exact term-count ranking in Rust.
        let like_clauses = vec!["lower(content) LIKE ?"; terms.len()].join(" OR ");
        let sql = format!("SELECT content FROM chunks WHERE {like_clauses}");
        let patterns: Vec<String> = terms.iter().map(|t| format!("%{t}%")).collect();

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(patterns.iter()), |row| {
            row.get::<_, String>(0)
        })?;

        let mut scored: Vec<(usize, String)> = Vec::new();
        for row in rows {
            let content = row?;
            let s = score(&content, &terms);
            if s > 0 {
                scored.push((s, content));
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(top_k).map(|(_, c)| c).collect())
    }

    async fn status(&self) -> Result<KnowledgeBaseStatus> {
        let conn = self.conn.lock();
        let total_chunks: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let total_documents: i64 =
            conn.query_row("SELECT COUNT(DISTINCT document) FROM chunks", [], |r| {
                r.get(0)
            })?;
        Ok(KnowledgeBaseStatus {
            total_chunks: total_chunks as u64,
            total_documents: total_documents as u64,
        })
    }

    fn name(&self) -> &str {
        "sqlite_keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_kb(dir: &TempDir) -> SqliteKnowledgeBase {
        SqliteKnowledgeBase::new(&dir.path().join("kb.db")).unwrap()
    }

    fn seed(kb: &SqliteKnowledgeBase) {
        kb.ingest(
            "manual",
            &[
                "Pricing starts at $0.50 per month for the basic plan.".to_string(),
                "The admin panel supports team management for all plans except basic.".to_string(),
                "All data is processed offline with no cloud dependency.".to_string(),
            ],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn empty_kb_reports_zero_chunks() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir);
        let status = kb.status().await.unwrap();
        assert!(status.is_empty());
        assert_eq!(status.total_documents, 0);
    }

    #[tokio::test]
    async fn status_counts_chunks_and_documents() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir);
        seed(&kb);
        kb.ingest("faq", &["How do I reset my password?".to_string()])
            .unwrap();

        let status = kb.status().await.unwrap();
        assert_eq!(status.total_chunks, 4);
        assert_eq!(status.total_documents, 2);
    }

    #[tokio::test]
    async fn search_ranks_by_matching_terms() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir);
        seed(&kb);

        let results = kb.search("what does the basic plan pricing cost", 2).await.unwrap();
        assert!(!results.is_empty());
        assert!(results[0].contains("Pricing"));
    }

    #[tokio::test]
    async fn search_no_match_returns_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir);
        seed(&kb);

        let results = kb.search("quantum chromodynamics", 4).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir);
        seed(&kb);

        let results = kb.search("plan", 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn ingest_skips_blank_chunks() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir);
        let stored = kb
            .ingest("doc", &["   ".to_string(), "real content".to_string()])
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn remove_document_drops_its_chunks() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir);
        seed(&kb);

        let removed = kb.remove_document("manual").unwrap();
        assert_eq!(removed, 3);
        assert!(kb.status().await.unwrap().is_empty());
    }

    #[test]
    fn query_terms_normalize_and_cap() {
        let terms = query_terms("What IS the Basic-Plan price?!");
        assert!(terms.contains(&"basic".to_string()));
        assert!(terms.contains(&"plan".to_string()));
        assert!(!terms.iter().any(|t| t.chars().any(char::is_uppercase)));

        let many = query_terms("one two three four five six seven eight nine ten");
        assert!(many.len() <= MAX_QUERY_TERMS);
    }
}
