//! Generic OpenAI-compatible streaming provider.
//! Most hosted LLM APIs follow the same `/v1/chat/completions` SSE format,
//! so a single implementation covers OpenAI, Groq, Mistral, local
//! inference servers, and the rest of the compatible family.

use crate::providers::traits::{ChatMessage, Generator};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub struct OpenAiCompatibleGenerator {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    model: String,
    temperature: f64,
    client: Client,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: Option<&str>,
        model: &str,
        temperature: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            model: model.to_string(),
            temperature,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn from_config(config: &crate::config::ProviderConfig) -> Self {
        Self::new(
            "openai-compatible",
            &config.base_url,
            config.api_key.as_deref(),
            &config.model,
            config.temperature,
        )
    }

    /// Build the full URL for chat completions, detecting if base_url already
    /// includes the path. Allows custom providers with non-standard endpoints.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| {
                self.base_url
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            });

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

// ── SSE streaming types ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamChatResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse SSE lines from a buffer and extract `data:` payloads.
/// Returns (parsed_payloads, remaining_buffer).
fn parse_sse_lines(buffer: &str) -> (Vec<String>, String) {
    let mut payloads = Vec::new();
    let mut remaining = String::new();

    for line in buffer.split('\n') {
        if let Some(data) = line.strip_prefix("data: ") {
            let data = data.trim();
            if !data.is_empty() && data != "[DONE]" {
                payloads.push(data.to_string());
            }
        }
        // Non-data lines (comments, blanks) are ignored
    }

    // If the buffer doesn't end with a newline, the last segment is incomplete
    if !buffer.ends_with('\n') {
        if let Some(last_newline) = buffer.rfind('\n') {
            remaining = buffer[last_newline + 1..].to_string();
        } else {
            remaining = buffer.to_string();
        }
    }

    (payloads, remaining)
}

fn drain_payloads(
    buffer: &str,
    content_buf: &mut String,
    tx: &mpsc::UnboundedSender<String>,
) -> String {
    let (payloads, remaining) = parse_sse_lines(buffer);
    for payload in payloads {
        if let Ok(chunk) = serde_json::from_str::<StreamChatResponse>(&payload) {
            for choice in &chunk.choices {
                if let Some(ref content) = choice.delta.content {
                    content_buf.push_str(content);
                    // Receiver may be gone; generation still runs to completion.
                    let _ = tx.send(content.clone());
                }
            }
        }
    }
    remaining
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    async fn stream_generate(
        &self,
        messages: &[ChatMessage],
        tx: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "{} API key not set. Set provider.api_key or the SAGECHAT_API_KEY env var.",
                self.name
            )
        })?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| Message {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: self.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(self.chat_completions_url())
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }

        let mut content_buf = String::new();
        let mut sse_buf = String::new();
        let mut byte_stream = response.bytes_stream();

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = chunk_result?;
            sse_buf.push_str(&String::from_utf8_lossy(&bytes));
            sse_buf = drain_payloads(&sse_buf, &mut content_buf, &tx);
        }

        // Process any remaining SSE data
        if !sse_buf.is_empty() {
            drain_payloads(&sse_buf, &mut content_buf, &tx);
        }

        if content_buf.is_empty() {
            anyhow::bail!("No response from {}", self.name);
        }
        Ok(content_buf)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_generator(url: &str, key: Option<&str>) -> OpenAiCompatibleGenerator {
        OpenAiCompatibleGenerator::new("test", url, key, "test-model", 0.3)
    }

    #[test]
    fn strips_trailing_slash() {
        let g = make_generator("https://example.com/", None);
        assert_eq!(g.base_url, "https://example.com");
    }

    #[test]
    fn chat_completions_url_appends_path() {
        let g = make_generator("https://api.openai.com/v1", None);
        assert_eq!(
            g.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_keeps_full_endpoint() {
        let g = make_generator("https://my-api.example.com/v2/llm/chat/completions", None);
        assert_eq!(
            g.chat_completions_url(),
            "https://my-api.example.com/v2/llm/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_requires_exact_suffix_match() {
        let g = make_generator("https://my-api.example.com/chat/completions-proxy", None);
        assert_eq!(
            g.chat_completions_url(),
            "https://my-api.example.com/chat/completions-proxy/chat/completions"
        );
    }

    #[tokio::test]
    async fn stream_generate_fails_without_key() {
        let g = make_generator("https://api.example.com", None);
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = g.stream_generate(&[ChatMessage::user("hello")], tx).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not set"));
    }

    #[test]
    fn request_serializes_with_stream_true() {
        let req = ChatRequest {
            model: "test-model".to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            temperature: 0.3,
            stream: true,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"stream\":true"));
        assert!(json.contains("test-model"));
    }

    // ── SSE parsing ──────────────────────────────────────────────

    #[test]
    fn parse_sse_lines_basic() {
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n";
        let (payloads, remaining) = parse_sse_lines(input);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("Hello"));
        assert!(remaining.is_empty());
    }

    #[test]
    fn parse_sse_lines_skips_done() {
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        let (payloads, _) = parse_sse_lines(input);
        assert_eq!(payloads.len(), 1);
    }

    #[test]
    fn parse_sse_lines_keeps_incomplete_tail() {
        let input = "data: {\"choices\":[]}\ndata: {\"choi";
        let (payloads, remaining) = parse_sse_lines(input);
        assert_eq!(payloads.len(), 2); // both lines start with "data: "
        assert_eq!(remaining, "data: {\"choi");
    }

    #[test]
    fn stream_chunk_deserializes() {
        let json = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let chunk: StreamChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hello"));
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn drain_payloads_forwards_tokens_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut content = String::new();
        let input = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
        );
        let remaining = drain_payloads(input, &mut content, &tx);
        assert!(remaining.is_empty());
        assert_eq!(content, "Hello");
        assert_eq!(rx.try_recv().unwrap(), "Hel");
        assert_eq!(rx.try_recv().unwrap(), "lo");
    }

    #[test]
    fn drain_payloads_tolerates_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut content = String::new();
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
        drain_payloads(input, &mut content, &tx);
        assert_eq!(content, "x");
    }
}
