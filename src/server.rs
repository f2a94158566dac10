//! HTTP surface for the conversation engine.
//!
//! - `GET /health`
//! - `POST /v1/chat`: resolve one message against a session
//! - `POST /v1/stream`: stream a prompt as extracted JSON objects over SSE,
//!   one `data: <object>` frame per object, a `{"fallback": ...}` frame when
//!   nothing parsed, and a final `data: [DONE]`

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use base64::Engine as _;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::agent::StopReason;
use crate::agent::types::{PROVIDER_APOLOGY, QUOTA_APOLOGY};
use crate::config::ServerConfig;
use crate::engine::{Attachment, ConversationEngine, UserInput};
use crate::error::{Result, SpeechError};
use crate::stream::ExtractorEvent;
use crate::stream::frames::DONE_SENTINEL;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `POST /v1/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub message: String,
    /// Optional base64-encoded image.
    #[serde(default)]
    pub image: Option<ImagePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Standard base64.
    pub data: String,
}

/// Response of `POST /v1/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub reply: String,
    pub stop_reason: StopReason,
    pub rounds: u32,
    pub tool_calls: Vec<ToolCallSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub name: String,
    pub result: String,
    pub is_error: bool,
}

/// Body of `POST /v1/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    pub prompt: String,
}

/// Error body for rejected requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Build the router over a shared engine.
pub fn router(engine: Arc<ConversationEngine>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/chat", post(handle_chat))
        .route("/v1/stream", post(handle_stream))
        .with_state(engine)
}

/// A running HTTP server.
pub struct ChatServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ChatServer {
    /// Bind `{host}:{port}` (port `0` auto-assigns) and serve in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Server`] if the listener cannot bind.
    pub async fn start(engine: Arc<ConversationEngine>, config: &ServerConfig) -> Result<Self> {
        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SpeechError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| SpeechError::Server(format!("failed to get local addr: {e}")))?;

        info!("colloquy server listening on http://{addr}");

        let app = router(engine);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_chat(
    State(engine): State<Arc<ConversationEngine>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.message.trim().is_empty() && request.image.is_none() {
        return bad_request("message must not be empty");
    }

    let mut input = UserInput::text(request.session_id, request.message);
    if let Some(image) = request.image {
        match base64::engine::general_purpose::STANDARD.decode(image.data.as_bytes()) {
            Ok(bytes) => {
                input = input.with_attachment(Attachment {
                    mime_type: image.mime_type,
                    bytes,
                });
            }
            Err(e) => return bad_request(format!("image data is not valid base64: {e}")),
        }
    }

    let outcome = engine.handle_message(input).await;
    tracing::debug!(route = "/v1/chat", session_id = %outcome.session_id, "chat handled");

    let reply = outcome.reply;
    Json(ChatResponse {
        session_id: outcome.session_id,
        reply: reply.final_text,
        stop_reason: reply.stop_reason,
        rounds: reply.rounds,
        tool_calls: reply
            .tool_calls
            .into_iter()
            .map(|executed| ToolCallSummary {
                name: executed.call.name,
                result: executed.result.text,
                is_error: executed.result.is_error,
            })
            .collect(),
    })
    .into_response()
}

async fn handle_stream(
    State(engine): State<Arc<ConversationEngine>>,
    Json(request): Json<StreamRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let opened = engine.stream_objects(&request.prompt).await;

    let sse_stream = async_stream::stream! {
        match opened {
            Ok(events) => {
                let mut events = Box::pin(events);
                while let Some(event) = events.next().await {
                    yield Ok(Event::default().data(event.payload()));
                    if event == ExtractorEvent::Done {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(route = "/v1/stream", error = %e, "stream failed to open");
                let apology = if e.is_quota() { QUOTA_APOLOGY } else { PROVIDER_APOLOGY };
                let body = serde_json::json!({ "error": apology });
                yield Ok(Event::default().data(body.to_string()));
                yield Ok(Event::default().data(DONE_SENTINEL));
            }
        }
    };

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
