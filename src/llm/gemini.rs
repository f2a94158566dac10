//! Gemini `generateContent` API adapter.
//!
//! Implements [`ModelProvider`] for Google's Gemini REST API with function
//! calling and SSE streaming.
//!
//! # Wire Shape
//!
//! ```text
//! POST {base}/v1beta/models/{model}:generateContent
//! { "contents": [...], "systemInstruction": {...}, "tools": [{"functionDeclarations": [...]}] }
//!
//! → { "candidates": [{ "content": { "role": "model", "parts": [...] } }] }
//! ```
//!
//! A model turn that requested function calls is kept verbatim (the candidate
//! `content` object) and echoed back unchanged in the next request, which is
//! what lets the model recognize its own prior call.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};

use super::error::LlmError;
use super::message::{DialogueTurn, Part, Role};
use super::provider::{ModelProvider, ModelRequest, ModelResponse, RequestedCall, TextStream};
use super::sse::SseLineParser;

// ── Configuration ──────────────────────────────────────────────

/// Configuration for the Gemini adapter.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: String,
    /// Base URL (defaults to `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Create a new Gemini config.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the base URL (useful for testing with mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ── Request Building ───────────────────────────────────────────

/// Build a `generateContent` request body.
pub fn build_request_body(request: &ModelRequest) -> Value {
    let contents: Vec<Value> = request.turns.iter().map(convert_turn).collect();
    let mut body = json!({ "contents": contents });

    if let Some(instruction) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }

    if !request.tools.is_empty() {
        let declarations: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    body
}

/// Convert one dialogue turn to a Gemini `content` object.
///
/// Turns carrying a raw payload are returned as-is.
pub fn convert_turn(turn: &DialogueTurn) -> Value {
    if let Some(raw) = &turn.raw {
        return raw.clone();
    }

    let role = match turn.role {
        Role::User | Role::Function => "user",
        Role::Model => "model",
    };

    let parts: Vec<Value> = turn
        .parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => json!({ "text": text }),
            Part::InlineData { mime_type, data } => json!({
                "inlineData": { "mimeType": mime_type, "data": data }
            }),
            Part::FunctionCall { name, args } => json!({
                "functionCall": { "name": name, "args": args }
            }),
            Part::FunctionResponse { name, response } => json!({
                "functionResponse": { "name": name, "response": response }
            }),
        })
        .collect();

    json!({ "role": role, "parts": parts })
}

// ── Response Parsing ───────────────────────────────────────────

/// Parse a `generateContent` response body.
pub fn parse_response(body: &Value) -> Result<ModelResponse, LlmError> {
    if let Some(reason) = body.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
        return Err(LlmError::ProviderError(format!("prompt blocked: {reason}")));
    }

    let Some(content) = body.pointer("/candidates/0/content") else {
        return Err(LlmError::ProviderError("response has no candidates".into()));
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in content
        .get("parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(t) = part.get("text").and_then(Value::as_str) {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            tool_calls.push(RequestedCall { name, args });
        }
    }

    let echo = (!tool_calls.is_empty()).then(|| {
        let parts = tool_calls
            .iter()
            .map(|c| Part::FunctionCall {
                name: c.name.clone(),
                args: c.args.clone(),
            })
            .collect();
        DialogueTurn::new(Role::Model, parts).with_raw(content.clone())
    });

    Ok(ModelResponse {
        text,
        tool_calls,
        echo,
    })
}

/// Extract the concatenated text parts of one streamed chunk.
pub fn chunk_text(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    let parts = value.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

// ── Error Mapping ──────────────────────────────────────────────

/// Map HTTP error responses to typed errors.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let api_status = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/status"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let detail = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(500).collect()
            }
        });

    match status.as_u16() {
        401 | 403 => LlmError::AuthError(detail),
        429 => LlmError::QuotaError(detail),
        _ if api_status == "RESOURCE_EXHAUSTED" => LlmError::QuotaError(detail),
        408 => LlmError::TimeoutError(detail),
        400 => LlmError::RequestError(detail),
        _ => LlmError::ProviderError(format!("HTTP {status}: {detail}")),
    }
}

fn map_send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::TimeoutError(format!("request timed out: {e}"))
    } else {
        LlmError::RequestError(format!("connection error: {e}"))
    }
}

// ── Adapter ────────────────────────────────────────────────────

/// Gemini provider adapter.
pub struct GeminiProvider {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini adapter.
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::ConfigError("Gemini API key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Returns a reference to the adapter configuration.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gemini request failed");
                map_send_error(e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            tracing::warn!(status = %status, "Gemini request returned error");
            return Err(map_http_error(status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, request.model
        );
        let body = build_request_body(request);
        tracing::debug!(model = %request.model, turns = request.turns.len(), "sending Gemini request");

        let response = self.post(&url, &body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| LlmError::ProviderError(format!("invalid response body: {e}")))?;
        parse_response(&value)
    }

    async fn stream_text(&self, request: &ModelRequest) -> Result<TextStream, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, request.model
        );
        let body = build_request_body(request);
        let response = self.post(&url, &body).await?;
        tracing::info!(model = %request.model, "Gemini stream starting");

        let byte_stream = response.bytes_stream();
        let stream = futures_util::stream::unfold(
            (byte_stream, SseLineParser::new(), Vec::<String>::new(), false),
            |(mut byte_stream, mut parser, mut buffer, mut ended)| async move {
                loop {
                    if !buffer.is_empty() {
                        let text = buffer.remove(0);
                        return Some((Ok(text), (byte_stream, parser, buffer, ended)));
                    }
                    if ended {
                        return None;
                    }
                    match byte_stream.next().await {
                        Some(Ok(chunk)) => {
                            for event in parser.push(&chunk) {
                                if event.is_done() {
                                    continue;
                                }
                                buffer.extend(chunk_text(&event.data));
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Gemini stream error");
                            ended = true;
                            return Some((
                                Err(LlmError::StreamError(format!("stream read error: {e}"))),
                                (byte_stream, parser, buffer, ended),
                            ));
                        }
                        None => {
                            ended = true;
                            if let Some(event) = parser.flush() {
                                buffer.extend(chunk_text(&event.data));
                            }
                        }
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::llm::provider::ToolDefinition;

    #[test]
    fn config_builder_trims_base_url() {
        let config = GeminiConfig::new("k").with_base_url("http://localhost:9/");
        assert_eq!(config.base_url, "http://localhost:9");
    }

    #[test]
    fn empty_key_rejected() {
        let err = GeminiProvider::new(GeminiConfig::new("  ")).err().unwrap();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn body_carries_instruction_and_tools() {
        let request = ModelRequest::new("m", vec![DialogueTurn::user_text("hi")])
            .with_system_instruction(Some("be kind".into()))
            .with_tools(vec![ToolDefinition::new(
                "query_items",
                "look up items",
                json!({"type": "object"}),
            )]);
        let body = build_request_body(&request);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be kind");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "query_items"
        );
    }

    #[test]
    fn body_omits_empty_tools() {
        let body = build_request_body(&ModelRequest::new("m", Vec::new()));
        assert!(body.get("tools").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn inline_data_uses_camel_case() {
        let turn = DialogueTurn::user_with_inline("what is this", "image/jpeg", b"xyz");
        let content = convert_turn(&turn);
        assert_eq!(content["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(content["parts"][1]["inlineData"]["data"], "eHl6");
    }

    #[test]
    fn raw_turn_echoed_verbatim() {
        let raw = json!({"role": "model", "parts": [{"functionCall": {"name": "x", "args": {}}, "thoughtSignature": "sig"}]});
        let turn = DialogueTurn::model_text("").with_raw(raw.clone());
        assert_eq!(convert_turn(&turn), raw);
    }

    #[test]
    fn function_results_sent_as_user_role() {
        let turn = DialogueTurn::function_results([("stage_item", "ok")]);
        let content = convert_turn(&turn);
        assert_eq!(content["role"], "user");
        assert_eq!(
            content["parts"][0]["functionResponse"]["response"]["result"],
            "ok"
        );
    }

    #[test]
    fn parse_text_response() {
        let body = json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]}}]});
        let response = parse_response(&body).unwrap();
        assert_eq!(response.text, "Hello there");
        assert!(!response.has_tool_calls());
        assert!(response.echo.is_none());
    }

    #[test]
    fn parse_function_call_keeps_echo() {
        let content = json!({"role": "model", "parts": [
            {"functionCall": {"name": "query_items", "args": {"brand": "Acme"}}},
            {"functionCall": {"name": "stage_item", "args": {"name": "lamp"}}}
        ]});
        let body = json!({"candidates": [{"content": content.clone()}]});
        let response = parse_response(&body).unwrap();
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].name, "query_items");
        assert_eq!(response.tool_calls[1].args["name"], "lamp");
        let echo = response.echo.unwrap();
        assert_eq!(echo.raw, Some(content));
        assert_eq!(echo.function_calls().len(), 2);
    }

    #[test]
    fn parse_missing_candidates_is_provider_error() {
        let err = parse_response(&json!({})).unwrap_err();
        assert_eq!(err.code(), "PROVIDER_ERROR");
    }

    #[test]
    fn parse_blocked_prompt() {
        let err = parse_response(&json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap_err();
        assert!(err.message().contains("SAFETY"));
    }

    #[test]
    fn chunk_text_extracts_parts() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"}]}}]}"#;
        assert_eq!(chunk_text(data).as_deref(), Some("{\"a\":"));
        assert!(chunk_text("not json").is_none());
        assert!(chunk_text(r#"{"candidates":[]}"#).is_none());
    }

    #[test]
    fn http_error_mapping() {
        use reqwest::StatusCode;
        assert_eq!(map_http_error(StatusCode::UNAUTHORIZED, "").code(), "AUTH_FAILED");
        assert_eq!(map_http_error(StatusCode::FORBIDDEN, "").code(), "AUTH_FAILED");
        assert_eq!(
            map_http_error(StatusCode::TOO_MANY_REQUESTS, "").code(),
            "QUOTA_EXCEEDED"
        );
        assert_eq!(
            map_http_error(StatusCode::BAD_REQUEST, "").code(),
            "REQUEST_FAILED"
        );
        assert_eq!(
            map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "").code(),
            "PROVIDER_ERROR"
        );
    }

    #[test]
    fn resource_exhausted_status_is_quota() {
        let body = r#"{"error":{"code":503,"message":"out of capacity","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = map_http_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, body);
        assert!(err.is_quota());
        assert_eq!(err.message(), "out of capacity");
    }

    #[test]
    fn empty_body_message() {
        let err = map_http_error(reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(err.message().contains("no response body"));
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GeminiProvider>();
        assert_send_sync::<GeminiConfig>();
    }
}
