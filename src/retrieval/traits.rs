//! Retrieval traits and types for knowledge-base context search.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Readiness snapshot of the knowledge base, reported to clients at handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeBaseStatus {
    pub total_chunks: u64,
    pub total_documents: u64,
}

impl KnowledgeBaseStatus {
    pub fn is_empty(&self) -> bool {
        self.total_chunks == 0
    }
}

/// Turns a question into ranked context passages.
#[async_trait]
pub trait Retrieval: Send + Sync {
    /// Return up to `top_k` passages ranked by relevance. An empty result
    /// means "no relevant content", not an error.
    async fn search(&self, question: &str, top_k: usize) -> Result<Vec<String>>;

    /// Current readiness snapshot.
    async fn status(&self) -> Result<KnowledgeBaseStatus>;

    fn name(&self) -> &str;
}
