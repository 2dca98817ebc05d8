//! Per-connection chat session handling.
//!
//! Each accepted WebSocket runs one handler task through two phases:
//! handshake (`AwaitingInit → Initialized`, or straight to `Closed`) and the
//! turn loop. The socket sink is owned by a writer task; everything else
//! sends [`ServerEvent`]s through an unbounded channel, and the registry
//! holds a clone of that sender so the heartbeat sweeper can probe liveness
//! without touching the socket.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::ChatError;
use super::history::{ChatTurn, HistoryWindow};
use super::prompt;
use super::protocol::{self, ServerEvent};
use super::registry::{ConnectionHandle, ConnectionRegistry};
use crate::auth::Authenticator;
use crate::providers::Generator;
use crate::retrieval::{KnowledgeBaseStatus, Retrieval};
use crate::sessions::{Session, SessionStore};

const WELCOME_MESSAGE: &str =
    "Connected to the knowledge-base assistant. Ask a question to get started.";

/// Collaborators and settings shared by every connection handler.
pub struct ChatDeps {
    pub auth: Arc<dyn Authenticator>,
    pub sessions: Arc<dyn SessionStore>,
    pub retrieval: Arc<dyn Retrieval>,
    pub generator: Arc<dyn Generator>,
    pub registry: Arc<ConnectionRegistry>,
    pub settings: ChatSettings,
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub knowledge_base_key: String,
    pub top_k: usize,
    pub history_window: usize,
    pub init_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl ChatSettings {
    pub fn from_config(chat: &crate::config::ChatConfig) -> Self {
        Self {
            knowledge_base_key: chat.knowledge_base_key.clone(),
            top_k: chat.top_k,
            history_window: chat.history_window,
            init_timeout: Duration::from_secs(chat.init_timeout_secs),
            heartbeat_interval: Duration::from_secs(chat.heartbeat_interval_secs),
        }
    }
}

/// Entry point for an upgraded socket. Owns the full connection lifecycle:
/// writer task, handshake, turn loop, and exactly-once registry cleanup.
pub async fn handle_socket(socket: WebSocket, token: String, deps: Arc<ChatDeps>) {
    let connection_id = Uuid::new_v4();
    let (sink, mut inbound) = socket.split();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(write_events(sink, events_rx));

    let result = run_connection(connection_id, &token, &mut inbound, &events_tx, &deps).await;

    // Idempotent with the sweeper's removal; a no-op when the handshake
    // never reached registration.
    deps.registry
        .unregister(&deps.settings.knowledge_base_key, connection_id);

    match result {
        Ok(()) | Err(ChatError::Transport) => {
            tracing::info!(%connection_id, "connection closed");
        }
        Err(err) => {
            tracing::warn!(%connection_id, kind = err.kind(), error = %err, "connection terminated");
        }
    }

    // Dropping the last sender lets the writer drain queued events, send a
    // close frame, and exit.
    drop(events_tx);
    let _ = writer.await;
}

/// Forward events to the socket as JSON text frames until the channel
/// closes or the peer disappears.
async fn write_events(
    mut sink: SplitSink<WebSocket, Message>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Ok(text) = serde_json::to_string(&event) else {
            continue;
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Drive one connection: handshake, readiness event, then the turn loop.
/// Generic over the inbound frame stream so the protocol can be exercised
/// without a real socket.
pub(crate) async fn run_connection<S>(
    connection_id: Uuid,
    token: &str,
    inbound: &mut S,
    events: &mpsc::UnboundedSender<ServerEvent>,
    deps: &ChatDeps,
) -> Result<(), ChatError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let ready = match handshake(connection_id, token, inbound, events, deps).await {
        Ok(ready) => ready,
        Err(err) => {
            if err.is_reportable() {
                let _ = events.send(ServerEvent::Error {
                    error: err.to_string(),
                });
            }
            return Err(err);
        }
    };

    let _ = events.send(ServerEvent::Initialized {
        session_id: ready.session.session_id.clone(),
        knowledge_base_status: ready.kb_status.clone(),
        message: WELCOME_MESSAGE.to_string(),
    });
    tracing::info!(
        %connection_id,
        session_id = %ready.session.session_id,
        "chat session initialized"
    );

    turn_loop(connection_id, &ready.session, inbound, events, deps).await
}

struct Ready {
    session: Session,
    kb_status: KnowledgeBaseStatus,
}

/// Handshake: init message within the deadline, identity resolution,
/// registry insertion, knowledge-base readiness, session resolution.
/// Any error here is fatal to the connection.
async fn handshake<S>(
    connection_id: Uuid,
    token: &str,
    inbound: &mut S,
    events: &mpsc::UnboundedSender<ServerEvent>,
    deps: &ChatDeps,
) -> Result<Ready, ChatError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let raw = match tokio::time::timeout(deps.settings.init_timeout, next_text(inbound)).await {
        Ok(received) => received?,
        Err(_) => {
            return Err(ChatError::Protocol(format!(
                "initialization timeout; send an initialization message within {} seconds",
                deps.settings.init_timeout.as_secs()
            )))
        }
    };
    let init = protocol::parse_init(&raw)?;

    let identity = deps
        .auth
        .resolve(token)
        .await
        .map_err(|e| ChatError::Auth(format!("authentication backend failure: {e}")))?
        .ok_or_else(|| ChatError::Auth("invalid token".to_string()))?;
    if !identity.active {
        return Err(ChatError::Auth("user not found or inactive".to_string()));
    }

    deps.registry.register(
        &deps.settings.knowledge_base_key,
        connection_id,
        ConnectionHandle::new(events.clone()),
    );

    let kb_status = deps
        .retrieval
        .status()
        .await
        .map_err(|e| ChatError::Resource(format!("knowledge base unavailable: {e}")))?;
    if kb_status.is_empty() {
        return Err(ChatError::Resource(
            "knowledge base is empty; ask an administrator to ingest documents".to_string(),
        ));
    }

    let session = resolve_session(&init, &identity.user_id, deps).await?;
    Ok(Ready { session, kb_status })
}

/// Exactly one session per connection: look up a supplied id scoped to the
/// caller, create a fresh session when it is missing or none was supplied.
async fn resolve_session(
    init: &protocol::InitMessage,
    user_id: &str,
    deps: &ChatDeps,
) -> Result<Session, ChatError> {
    if let Some(session_id) = &init.session_id {
        match deps
            .sessions
            .find_by_id(session_id, user_id)
            .await
            .map_err(store_failure)?
        {
            Some(session) => return Ok(session),
            None => {
                tracing::info!(%session_id, "supplied session not found; creating a new one");
            }
        }
    }
    deps.sessions
        .create(user_id, &deps.settings.knowledge_base_key, None)
        .await
        .map_err(store_failure)
}

fn store_failure(e: anyhow::Error) -> ChatError {
    ChatError::Resource(format!("session store failure: {e}"))
}

/// Question/answer loop. Recoverable errors notify the client and continue;
/// only a transport failure ends the loop.
async fn turn_loop<S>(
    connection_id: Uuid,
    session: &Session,
    inbound: &mut S,
    events: &mpsc::UnboundedSender<ServerEvent>,
    deps: &ChatDeps,
) -> Result<(), ChatError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let mut history = HistoryWindow::new(deps.settings.history_window);

    loop {
        let raw = next_text(inbound).await?;

        let question = match protocol::parse_question(&raw) {
            Ok(question) => question,
            Err(err) => {
                tracing::debug!(%connection_id, error = %err, "rejected question payload");
                let _ = events.send(ServerEvent::Error {
                    error: err.to_string(),
                });
                continue;
            }
        };

        match run_turn(&question, session, &mut history, events, deps).await {
            Ok(complete) => {
                let _ = events.send(complete);
            }
            Err(err) => {
                tracing::error!(
                    %connection_id,
                    session_id = %session.session_id,
                    kind = err.kind(),
                    error = %err,
                    "turn failed"
                );
                let _ = events.send(ServerEvent::Error {
                    error: err.to_string(),
                });
            }
        }
    }
}

/// One turn: retrieve context, stream generation tokens to the client,
/// record the completed turn. Returns the `complete` event to emit.
async fn run_turn(
    question: &str,
    session: &Session,
    history: &mut HistoryWindow,
    events: &mpsc::UnboundedSender<ServerEvent>,
    deps: &ChatDeps,
) -> Result<ServerEvent, ChatError> {
    let started = Instant::now();

    let chunks = deps
        .retrieval
        .search(question, deps.settings.top_k)
        .await
        .map_err(|e| ChatError::Generation(format!("retrieval failure: {e}")))?;

    let messages = prompt::build_messages(question, history, &chunks);

    // Tokens flow through a channel so a failed client send never reaches
    // into the generation call; the stream is drained to completion even if
    // the client is gone.
    let (token_tx, mut token_rx) = mpsc::unbounded_channel();
    let generator = Arc::clone(&deps.generator);
    let generation =
        tokio::spawn(async move { generator.stream_generate(&messages, token_tx).await });

    while let Some(token) = token_rx.recv().await {
        let _ = events.send(ServerEvent::Streaming { token });
    }

    let answer = generation
        .await
        .map_err(|e| ChatError::Generation(format!("generation task failed: {e}")))?
        .map_err(|e| ChatError::Generation(e.to_string()))?;

    let latency_ms = started.elapsed().as_millis() as u64;
    history.push(ChatTurn {
        question: question.to_string(),
        answer: answer.clone(),
        latency_ms,
    });

    deps.sessions
        .save_turn(&session.session_id, question, &answer, latency_ms, false)
        .await
        .map_err(|e| ChatError::Generation(format!("failed to persist turn: {e}")))?;

    Ok(ServerEvent::Complete {
        answer,
        time: started.elapsed().as_secs_f64(),
        session_id: session.session_id.clone(),
    })
}

/// Next text frame, skipping control frames. Close frames, stream errors,
/// and end-of-stream all surface as a transport error.
async fn next_text<S>(inbound: &mut S) -> Result<String, ChatError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => return Ok(text.to_string()),
            Ok(Message::Close(_)) | Err(_) => return Err(ChatError::Transport),
            Ok(_) => {}
        }
    }
    Err(ChatError::Transport)
}
