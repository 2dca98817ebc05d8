//! Prompt assembly: system directive + retrieved context + history window.

use super::history::HistoryWindow;
use crate::providers::ChatMessage;

/// Fixed system directive for every turn. Grounding rules keep answers
/// inside the retrieved documentation.
const SYSTEM_DIRECTIVE: &str = "\
You are a knowledge-base assistant. Answer the user's question using only \
the documentation context provided below.

Rules:
- Only state facts supported by the documentation context.
- If the context does not contain the answer, say so plainly and suggest \
the user rephrase or contact an administrator; never invent details.
- Use the chat history to resolve follow-up references, but treat the \
documentation context as the sole source of truth.
- Keep answers concise and directly address the question.";

/// Placeholder injected when retrieval finds nothing; generation still runs.
pub const NO_CONTEXT_PLACEHOLDER: &str =
    "(No relevant content found in the knowledge base for this question)";

/// Assemble the message list for one turn.
pub fn build_messages(
    question: &str,
    history: &HistoryWindow,
    context_chunks: &[String],
) -> Vec<ChatMessage> {
    let context_text = if context_chunks.is_empty() {
        NO_CONTEXT_PLACEHOLDER.to_string()
    } else {
        context_chunks.join("\n\n")
    };

    let system = format!(
        "{SYSTEM_DIRECTIVE}\n\nDOCUMENTATION CONTEXT:\n{context_text}\n\nCHAT HISTORY:\n{}",
        history.formatted()
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!("User's question: {question}")),
    ]
}
