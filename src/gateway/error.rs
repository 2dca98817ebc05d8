//! Error taxonomy for the chat session protocol.

use thiserror::Error;

/// Everything that can go wrong on a chat connection, bucketed by how it
/// propagates. Handshake errors are fatal to the connection; per-turn
/// generation errors are reported and the loop continues; transport errors
/// are never reported to the client (it is gone) and trigger cleanup only.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed, empty, or timed-out initialization or question payload.
    #[error("{0}")]
    Protocol(String),

    /// Unresolvable or inactive identity.
    #[error("{0}")]
    Auth(String),

    /// Knowledge base or a backing store is not ready.
    #[error("{0}")]
    Resource(String),

    /// Failure inside retrieval or generation for one turn.
    #[error("{0}")]
    Generation(String),

    /// Disconnect detected during send or receive.
    #[error("connection closed")]
    Transport,
}

impl ChatError {
    /// Whether the client should be told about this error. Transport errors
    /// cannot be delivered by definition.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, ChatError::Transport)
    }

    /// Short kind tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Protocol(_) => "protocol",
            ChatError::Auth(_) => "auth",
            ChatError::Resource(_) => "resource",
            ChatError::Generation(_) => "generation",
            ChatError::Transport => "transport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_not_reportable() {
        assert!(!ChatError::Transport.is_reportable());
        assert!(ChatError::Protocol("bad".into()).is_reportable());
        assert!(ChatError::Generation("boom".into()).is_reportable());
    }

    #[test]
    fn display_carries_the_message() {
        let err = ChatError::Auth("invalid token".into());
        assert_eq!(err.to_string(), "invalid token");
        assert_eq!(err.kind(), "auth");
    }
}
