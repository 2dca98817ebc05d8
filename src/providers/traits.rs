//! Generation provider traits and message types.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A single message in a generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Streaming text generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply, pushing each produced token into `tx` in order
    /// before the final text is returned. A dropped receiver must not abort
    /// generation; the final text is still returned.
    async fn stream_generate(
        &self,
        messages: &[ChatMessage],
        tx: mpsc::UnboundedSender<String>,
    ) -> Result<String>;

    fn name(&self) -> &str;
}
