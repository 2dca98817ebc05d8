//! Knowledge-base retrieval — turns questions into ranked context passages.

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteKnowledgeBase;
pub use traits::{KnowledgeBaseStatus, Retrieval};

use std::path::Path;

/// Factory: open the knowledge base rooted at the workspace.
pub fn create_retrieval(db_path: &Path) -> anyhow::Result<Box<dyn Retrieval>> {
    Ok(Box::new(SqliteKnowledgeBase::new(db_path)?))
}

/// Split a document into ingestable chunks: paragraphs merged up to
/// `max_chars`, oversized paragraphs hard-split at char boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() && current.chars().count() + paragraph.chars().count() + 2 > max_chars
        {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
