//! End-to-End Conversation Tests
//!
//! Load a TOML config from a temp directory, bootstrap the engine against a
//! mock Gemini endpoint and a JSON file store, and walk the stage/commit
//! flow across two user messages. The committed record must survive a
//! store reopen.

use colloquy::agent::StopReason;
use colloquy::config::load_config;
use colloquy::engine::{UserInput, bootstrap};
use colloquy::store::{JsonFileStore, RecordQuery, RecordStore};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-test:generateContent";

fn call_response(name: &str, args: Value) -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{"functionCall": {"name": name, "args": args}}]
            }
        }]
    })
}

fn text_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

/// Mount `responses` so they are served once each, in order.
async fn script(server: &MockServer, responses: Vec<Value>) {
    for body in responses {
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
}

fn write_config(dir: &TempDir, server: &MockServer, max_rounds: u32) -> std::path::PathBuf {
    let store_path = dir.path().join("data").join("records.json");
    let toml = format!(
        r#"
[model]
base_url = "{base}"
api_key = "test-key"
model = "gemini-test"
timeout_secs = 5

[agent]
max_rounds = {max_rounds}

[agent.retry]
max_attempts = 0
base_delay_ms = 1

[speech]
enabled = false

[store]
path = "{store}"
"#,
        base = server.uri(),
        store = store_path.display().to_string().replace('\\', "/"),
    );
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, toml).unwrap();
    config_path
}

// ────────────────────────────────────────────────────────────────────────────
// Stage and Commit
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stage_then_commit_across_messages_persists_record() {
    let server = MockServer::start().await;
    script(
        &server,
        vec![
            call_response(
                "stage_item",
                json!({"name": "Desk lamp", "category": "lamps", "condition": "used"}),
            ),
            text_response("I drafted a used desk lamp. What price and how many?"),
            call_response("commit_item", json!({"price": "24.50", "quantity": 2})),
            text_response("Saved two desk lamps at 24.50 each."),
        ],
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = load_config(&write_config(&dir, &server, 5)).unwrap();
    let engine = bootstrap(&config, false).await.unwrap();
    assert!(engine.speech().is_none());

    let first = engine
        .handle_message(UserInput::text(None, "Add my old desk lamp"))
        .await;
    assert_eq!(first.reply.stop_reason, StopReason::Complete);
    assert_eq!(first.reply.rounds, 2);
    assert!(first.reply.tool_calls[0].result.text.starts_with("Staged draft \"Desk lamp\""));
    {
        let (_, session) = engine.session(Some(first.session_id)).await;
        let session = session.lock().await;
        assert_eq!(session.staged.get().map(|e| e.name()), Some("Desk lamp"));
    }

    let second = engine
        .handle_message(UserInput::text(Some(first.session_id), "24.50, I have two"))
        .await;
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.reply.final_text, "Saved two desk lamps at 24.50 each.");
    let commit = &second.reply.tool_calls[0].result;
    assert!(!commit.is_error);
    assert_eq!(
        commit.text,
        "Saved \"Desk lamp\": 2 at $24.50 each. The draft is cleared."
    );

    // The second message's first request carries the whole first exchange.
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 4);
    let third: Value = serde_json::from_slice(&received[2].body).unwrap();
    assert_eq!(third["contents"].as_array().unwrap().len(), 5);

    engine.shutdown().await;

    let reopened = JsonFileStore::open(&config.store.path).unwrap();
    let records = reopened.query(&RecordQuery::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name(), "Desk lamp");
    assert_eq!(records[0].field("category"), Some("lamps"));
    assert_eq!(records[0].price, 24.5);
    assert_eq!(records[0].quantity, 2);
}

#[tokio::test]
async fn test_commit_without_stage_reaches_model_as_error_text() {
    let server = MockServer::start().await;
    script(
        &server,
        vec![
            call_response("commit_item", json!({"price": 5})),
            text_response("Tell me what the item is first."),
        ],
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = load_config(&write_config(&dir, &server, 5)).unwrap();
    let engine = bootstrap(&config, false).await.unwrap();

    let outcome = engine
        .handle_message(UserInput::text(None, "save it for five"))
        .await;
    assert_eq!(outcome.reply.stop_reason, StopReason::Complete);
    assert!(outcome.reply.tool_calls[0].result.is_error);

    let received = server.received_requests().await.unwrap();
    let second: Value = serde_json::from_slice(&received[1].body).unwrap();
    let result = second["contents"][2]["parts"][0]["functionResponse"]["response"]["result"]
        .as_str()
        .unwrap()
        .to_owned();
    assert!(result.contains("no item is staged"));
    assert!(!config.store.path.exists());
}

// ────────────────────────────────────────────────────────────────────────────
// Limits and Failures
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_round_cap_stops_tool_loop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(call_response("query_items", json!({}))),
        )
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = load_config(&write_config(&dir, &server, 2)).unwrap();
    let engine = bootstrap(&config, false).await.unwrap();

    let outcome = engine
        .handle_message(UserInput::text(None, "keep looking"))
        .await;
    assert_eq!(outcome.reply.stop_reason, StopReason::MaxRounds);
    assert_eq!(outcome.reply.rounds, 2);
    assert_eq!(outcome.reply.tool_calls.len(), 2);
    assert!(!outcome.reply.final_text.is_empty());
}

#[tokio::test]
async fn test_quota_failure_apologizes_and_keeps_history_clean() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "quota", "status": "RESOURCE_EXHAUSTED"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = load_config(&write_config(&dir, &server, 5)).unwrap();
    let engine = bootstrap(&config, false).await.unwrap();

    let outcome = engine.handle_message(UserInput::text(None, "hello")).await;
    assert_eq!(outcome.reply.stop_reason, StopReason::QuotaExceeded);
    assert!(!outcome.reply.final_text.is_empty());

    let (_, session) = engine.session(Some(outcome.session_id)).await;
    assert!(session.lock().await.history.is_empty());
}

#[tokio::test]
async fn test_bootstrap_without_key_fails() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "[model]\napi_key_env = \"COLLOQUY_TEST_NO_SUCH_MODEL_KEY\"\n",
    )
    .unwrap();
    let config = load_config(&config_path).unwrap();
    let err = bootstrap(&config, false).await.err().unwrap();
    assert!(err.to_string().contains("COLLOQUY_TEST_NO_SUCH_MODEL_KEY"));
}
