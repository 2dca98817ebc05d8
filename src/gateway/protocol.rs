//! Wire messages for the chat session protocol.
//!
//! Initialization is strict JSON: a malformed first message closes the
//! connection. Questions are tolerant: structured `{"question": ...}`
//! payloads and bare text are both accepted, so plain-text clients work.

use serde::{Deserialize, Serialize};

use super::error::ChatError;
use crate::retrieval::KnowledgeBaseStatus;

/// First client message on a connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitMessage {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Server-to-client events, discriminated by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ServerEvent {
    Initialized {
        session_id: String,
        knowledge_base_status: KnowledgeBaseStatus,
        message: String,
    },
    Streaming {
        token: String,
    },
    Complete {
        answer: String,
        /// Elapsed seconds for the whole turn.
        time: f64,
        session_id: String,
    },
    Heartbeat {},
    Error {
        error: String,
    },
}

/// Parse the initialization payload. Strict: no bare-text fallback.
pub fn parse_init(raw: &str) -> Result<InitMessage, ChatError> {
    if raw.trim().is_empty() {
        return Err(ChatError::Protocol(
            "empty initialization message received".to_string(),
        ));
    }
    serde_json::from_str(raw)
        .map_err(|e| ChatError::Protocol(format!("invalid initialization payload: {e}")))
}

/// Parse a question payload. A JSON object with a string `question` field
/// wins; anything that fails to parse as JSON is treated as bare question
/// text. The resolved question must be non-empty.
pub fn parse_question(raw: &str) -> Result<String, ChatError> {
    if raw.trim().is_empty() {
        return Err(ChatError::Protocol("empty message received".to_string()));
    }

    let question = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => match value.get("question") {
            Some(serde_json::Value::String(q)) => q.clone(),
            Some(_) => {
                return Err(ChatError::Protocol(
                    "question field must be a string".to_string(),
                ))
            }
            // Structured payload without a question field falls back to raw text
            None => raw.trim().to_string(),
        },
        Err(_) => raw.trim().to_string(),
    };

    if question.trim().is_empty() {
        return Err(ChatError::Protocol(
            "invalid or empty question".to_string(),
        ));
    }
    Ok(question.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_json(event: &ServerEvent) -> serde_json::Value {
        serde_json::to_value(event).unwrap()
    }

    #[test]
    fn init_parses_session_id() {
        let init = parse_init(r#"{"session_id": "abc"}"#).unwrap();
        assert_eq!(init.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn init_accepts_null_and_missing_session_id() {
        assert!(parse_init(r#"{"session_id": null}"#).unwrap().session_id.is_none());
        assert!(parse_init("{}").unwrap().session_id.is_none());
    }

    #[test]
    fn init_rejects_empty_payload() {
        let err = parse_init("   ").unwrap_err();
        assert!(err.to_string().contains("empty initialization"));
    }

    #[test]
    fn init_rejects_bare_text() {
        // Unlike questions, initialization has no plain-text fallback.
        let err = parse_init("hello there").unwrap_err();
        assert!(err.to_string().contains("invalid initialization payload"));
    }

    #[test]
    fn question_extracts_field() {
        let q = parse_question(r#"{"question": "What is X?"}"#).unwrap();
        assert_eq!(q, "What is X?");
    }

    #[test]
    fn question_falls_back_to_bare_text() {
        assert_eq!(parse_question("What is X?").unwrap(), "What is X?");
    }

    #[test]
    fn question_object_without_field_uses_raw_payload() {
        let q = parse_question(r#"{"query": "something"}"#).unwrap();
        assert_eq!(q, r#"{"query": "something"}"#);
    }

    #[test]
    fn question_rejects_non_string_field() {
        assert!(parse_question(r#"{"question": 42}"#).is_err());
        assert!(parse_question(r#"{"question": ""}"#).is_err());
    }

    #[test]
    fn question_rejects_empty() {
        assert!(parse_question("").is_err());
        assert!(parse_question("   ").is_err());
    }

    #[test]
    fn events_tag_with_status() {
        let heartbeat = as_json(&ServerEvent::Heartbeat {});
        assert_eq!(heartbeat, serde_json::json!({"status": "heartbeat"}));

        let streaming = as_json(&ServerEvent::Streaming {
            token: "hi".into(),
        });
        assert_eq!(streaming["status"], "streaming");
        assert_eq!(streaming["token"], "hi");

        let error = as_json(&ServerEvent::Error {
            error: "boom".into(),
        });
        assert_eq!(error["status"], "error");
    }

    #[test]
    fn complete_event_carries_answer_time_session() {
        let complete = as_json(&ServerEvent::Complete {
            answer: "42".into(),
            time: 1.25,
            session_id: "s-1".into(),
        });
        assert_eq!(complete["status"], "complete");
        assert_eq!(complete["answer"], "42");
        assert_eq!(complete["session_id"], "s-1");
        assert!((complete["time"].as_f64().unwrap() - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn initialized_event_includes_kb_status() {
        let initialized = as_json(&ServerEvent::Initialized {
            session_id: "s-1".into(),
            knowledge_base_status: KnowledgeBaseStatus {
                total_chunks: 3,
                total_documents: 1,
            },
            message: "ready".into(),
        });
        assert_eq!(initialized["status"], "initialized");
        assert_eq!(initialized["knowledge_base_status"]["total_chunks"], 3);
    }
}
