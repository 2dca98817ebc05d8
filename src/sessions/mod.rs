//! Session management — durable chat sessions and their completed turns.

pub mod in_memory;
pub mod sqlite;
pub mod traits;

pub use in_memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;
pub use traits::{Session, SessionStore};

use std::path::Path;

/// Factory: create the durable session store rooted at the workspace.
pub fn create_session_store(db_path: &Path) -> anyhow::Result<Box<dyn SessionStore>> {
    Ok(Box::new(SqliteSessionStore::new(db_path)?))
}
