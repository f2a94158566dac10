//! Multi-round orchestrator.
//!
//! Drives the loop for one user message: submit the transcript, dispatch
//! any requested tool calls, feed the results back, and repeat until the
//! model answers in plain text or the round budget runs out.
//!
//! ```text
//! AWAITING_MODEL ──calls + echo──▶ EXECUTING_TOOLS ──▶ AWAITING_MODEL ...
//!        │
//!        └──text only / budget spent──▶ DONE
//! ```
//!
//! The message's turns are committed to the session history in one step,
//! only once the loop ends with an answer. Provider failures leave the
//! history untouched and produce an in-character apology instead.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::session::Session;
use super::types::{
    AgentReply, ExecutedToolCall, OrchestratorConfig, PROVIDER_APOLOGY, QUOTA_APOLOGY,
    ROUND_LIMIT_PLACEHOLDER, StopReason,
};
use crate::llm::error::LlmError;
use crate::llm::message::DialogueTurn;
use crate::llm::provider::{ModelProvider, ModelRequest, ModelResponse, ToolDefinition};
use crate::tools::registry::ToolRegistry;
use crate::tools::types::ToolCall;

/// The multi-round orchestrator.
///
/// Holds no per-conversation state; everything mutable lives in the
/// [`Session`] passed to [`handle`](Self::handle).
pub struct Orchestrator {
    config: OrchestratorConfig,
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    tool_definitions: Vec<ToolDefinition>,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        provider: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let tool_definitions = registry.definitions();
        Self {
            config,
            provider,
            registry,
            tool_definitions,
        }
    }

    /// Returns the orchestrator configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Resolve one user message.
    ///
    /// Always returns a reply; failures are reported through
    /// [`AgentReply::stop_reason`] and an apology text.
    pub async fn handle(
        &self,
        session: &mut Session,
        user_turn: DialogueTurn,
        cancel: &CancellationToken,
    ) -> AgentReply {
        let session_id = session.id;
        let mut working = session.history.snapshot();
        working.push(user_turn.clone());
        let mut pending = vec![user_turn];
        let mut executed: Vec<ExecutedToolCall> = Vec::new();
        let mut last_text: Option<String> = None;

        for round in 1..=self.config.max_rounds {
            if cancel.is_cancelled() {
                tracing::info!(%session_id, round, "message cancelled");
                return reply(String::new(), round - 1, StopReason::Cancelled, executed);
            }

            let span = tracing::info_span!("agent_round", %session_id, round);
            let request = ModelRequest::new(&self.config.model, working.clone())
                .with_system_instruction(self.config.system_instruction.clone())
                .with_tools(self.tool_definitions.clone());

            let response = match self
                .send_with_retry(&request, cancel)
                .instrument(span.clone())
                .await
            {
                Ok(response) => response,
                Err(e) if cancel.is_cancelled() => {
                    tracing::info!(%session_id, round, error = %e, "message cancelled");
                    return reply(String::new(), round, StopReason::Cancelled, executed);
                }
                Err(e) => return failure_reply(&e, round, executed),
            };

            let ModelResponse {
                text,
                tool_calls,
                echo,
            } = response;
            if !text.trim().is_empty() {
                last_text = Some(text.clone());
            }

            let echo = match echo {
                Some(echo) if !tool_calls.is_empty() => echo,
                _ => {
                    let final_text = if text.trim().is_empty() {
                        last_text.unwrap_or_else(|| ROUND_LIMIT_PLACEHOLDER.to_string())
                    } else {
                        text
                    };
                    pending.push(DialogueTurn::model_text(final_text.clone()));
                    commit_turns(session, pending);
                    span.in_scope(|| tracing::info!(tool_calls = executed.len(), "message resolved"));
                    return reply(final_text, round, StopReason::Complete, executed);
                }
            };

            let calls: Vec<ToolCall> = tool_calls
                .into_iter()
                .map(|c| ToolCall {
                    name: c.name,
                    arguments: c.args,
                    round,
                })
                .collect();
            span.in_scope(|| tracing::debug!(calls = calls.len(), "dispatching tool calls"));

            let results = self
                .registry
                .dispatch(&calls, &mut session.staged)
                .instrument(span)
                .await;

            let result_turn = DialogueTurn::function_results(
                calls
                    .iter()
                    .zip(&results)
                    .map(|(c, r)| (c.name.as_str(), r.text.as_str())),
            );
            working.push(echo.clone());
            working.push(result_turn.clone());
            pending.push(echo);
            pending.push(result_turn);
            executed.extend(
                calls
                    .into_iter()
                    .zip(results)
                    .map(|(call, result)| ExecutedToolCall { call, result }),
            );
        }

        let rounds = self.config.max_rounds;
        tracing::warn!(%session_id, rounds, "round budget exhausted with tool calls pending");
        let final_text = last_text.unwrap_or_else(|| ROUND_LIMIT_PLACEHOLDER.to_string());
        pending.push(DialogueTurn::model_text(final_text.clone()));
        commit_turns(session, pending);
        reply(final_text, rounds, StopReason::MaxRounds, executed)
    }

    async fn send_with_retry(
        &self,
        request: &ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, LlmError> {
        let mut retry_attempt = 0u32;

        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(LlmError::RequestError("request cancelled".to_string()));
                }
                outcome = tokio::time::timeout(
                    self.config.request_timeout,
                    self.provider.generate(request),
                ) => outcome,
            };

            let error = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(error)) => error,
                Err(_) => LlmError::TimeoutError(format!(
                    "request timed out after {}s",
                    self.config.request_timeout.as_secs()
                )),
            };

            if !error.is_retryable() || retry_attempt >= self.config.retry.max_attempts {
                tracing::warn!(
                    provider = self.provider.name(),
                    code = error.code(),
                    attempts = retry_attempt + 1,
                    "model request failed"
                );
                return Err(error);
            }

            retry_attempt = retry_attempt.saturating_add(1);
            let delay = self.config.retry.delay_for_attempt(retry_attempt);
            tracing::debug!(
                code = error.code(),
                retry_attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying model request"
            );
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(LlmError::RequestError(
                        "request cancelled during retry backoff".to_string(),
                    ));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn commit_turns(session: &mut Session, turns: Vec<DialogueTurn>) {
    session.history.extend(turns);
    session.history.enforce_window();
}

fn reply(
    final_text: String,
    rounds: u32,
    stop_reason: StopReason,
    tool_calls: Vec<ExecutedToolCall>,
) -> AgentReply {
    AgentReply {
        final_text,
        rounds,
        stop_reason,
        tool_calls,
    }
}

fn failure_reply(error: &LlmError, round: u32, executed: Vec<ExecutedToolCall>) -> AgentReply {
    if error.is_quota() {
        tracing::warn!(round, error = %error, "provider quota exhausted");
        reply(QUOTA_APOLOGY.to_string(), round, StopReason::QuotaExceeded, executed)
    } else {
        tracing::error!(round, error = %error, "provider failed");
        reply(PROVIDER_APOLOGY.to_string(), round, StopReason::ProviderError, executed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::agent::types::RetryPolicy;
    use crate::llm::message::{Part, Role};
    use crate::llm::provider::RequestedCall;
    use crate::store::MemoryRecordStore;
    use crate::tools::standard_registry;

    /// Replays scripted responses and records every request it saw.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
        seen: Mutex<Vec<ModelRequest>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ModelResponse, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ModelResponse::text("script exhausted")))
        }
    }

    /// Always asks for another query.
    struct LoopingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ModelProvider for LoopingProvider {
        fn name(&self) -> &str {
            "looping"
        }

        async fn generate(&self, _request: &ModelRequest) -> Result<ModelResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let text = if n == 1 { "Let me check again." } else { "" };
            Ok(tool_response(text, vec![("query_items", json!({}))]))
        }
    }

    fn tool_response(text: &str, calls: Vec<(&str, serde_json::Value)>) -> ModelResponse {
        let tool_calls: Vec<RequestedCall> = calls
            .into_iter()
            .map(|(name, args)| RequestedCall {
                name: name.into(),
                args,
            })
            .collect();
        let parts = tool_calls
            .iter()
            .map(|c| Part::FunctionCall {
                name: c.name.clone(),
                args: c.args.clone(),
            })
            .collect();
        let echo = DialogueTurn::new(Role::Model, parts).with_raw(json!({"role": "model", "marker": "echo"}));
        ModelResponse {
            text: text.into(),
            tool_calls,
            echo: Some(echo),
        }
    }

    fn orchestrator(provider: Arc<dyn ModelProvider>, max_rounds: u32) -> Orchestrator {
        let registry = Arc::new(standard_registry(Arc::new(MemoryRecordStore::new()), None));
        let config = OrchestratorConfig::new("test-model")
            .with_max_rounds(max_rounds)
            .with_retry(RetryPolicy::none().with_base_delay_ms(1));
        Orchestrator::new(config, provider, registry)
    }

    #[tokio::test]
    async fn plain_answer_completes_in_one_round() {
        let provider = ScriptedProvider::new(vec![Ok(ModelResponse::text("Hello!"))]);
        let orch = orchestrator(provider.clone(), 5);
        let mut session = Session::new(10);

        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("hi"), &CancellationToken::new())
            .await;

        assert_eq!(reply.final_text, "Hello!");
        assert_eq!(reply.rounds, 1);
        assert_eq!(reply.stop_reason, StopReason::Complete);
        assert_eq!(session.history.len(), 2);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].tools.len(), 3);
        assert!(seen[0].system_instruction.is_some());
    }

    #[tokio::test]
    async fn stage_then_commit_across_rounds() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("", vec![("stage_item", json!({"name": "Lamp"}))])),
            Ok(tool_response("", vec![("commit_item", json!({"price": 12}))])),
            Ok(ModelResponse::text("Saved your lamp.")),
        ]);
        let orch = orchestrator(provider.clone(), 5);
        let mut session = Session::new(10);

        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("add a lamp for 12"), &CancellationToken::new())
            .await;

        assert_eq!(reply.stop_reason, StopReason::Complete);
        assert_eq!(reply.rounds, 3);
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].call.round, 1);
        assert_eq!(reply.tool_calls[1].call.round, 2);
        assert!(reply.tool_calls[1].result.text.starts_with("Saved"));
        assert!(session.staged.is_empty());

        // Second request echoes the raw call turn, then the function results.
        let seen = provider.seen.lock().unwrap();
        let second = &seen[1].turns;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].raw, Some(json!({"role": "model", "marker": "echo"})));
        assert_eq!(second[2].role, Role::Function);

        let roles: Vec<Role> = session.history.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Model, Role::Function, Role::Model, Role::Function, Role::Model]
        );
    }

    #[tokio::test]
    async fn commit_without_stage_is_reported_not_thrown() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("", vec![("commit_item", json!({"price": 5}))])),
            Ok(ModelResponse::text("What would you like to add first?")),
        ]);
        let orch = orchestrator(provider, 5);
        let mut session = Session::new(10);
        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("save it"), &CancellationToken::new())
            .await;
        assert_eq!(reply.stop_reason, StopReason::Complete);
        assert!(reply.tool_calls[0].result.is_error);
        assert!(reply.tool_calls[0].result.text.contains("no item is staged"));
    }

    #[tokio::test]
    async fn round_cap_returns_last_text() {
        let provider = Arc::new(LoopingProvider {
            calls: AtomicU32::new(0),
        });
        let orch = orchestrator(provider.clone(), 3);
        let mut session = Session::new(10);

        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("find lamps"), &CancellationToken::new())
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(reply.stop_reason, StopReason::MaxRounds);
        assert_eq!(reply.rounds, 3);
        assert_eq!(reply.tool_calls.len(), 3);
        assert_eq!(reply.final_text, "Let me check again.");
        assert_eq!(session.history.turns().last().map(DialogueTurn::text).as_deref(), Some("Let me check again."));
    }

    #[tokio::test]
    async fn round_cap_without_text_uses_placeholder() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("", vec![("query_items", json!({}))])),
            Ok(tool_response("", vec![("query_items", json!({}))])),
        ]);
        let orch = orchestrator(provider, 2);
        let mut session = Session::new(10);
        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("?"), &CancellationToken::new())
            .await;
        assert_eq!(reply.stop_reason, StopReason::MaxRounds);
        assert_eq!(reply.final_text, ROUND_LIMIT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn calls_without_echo_are_treated_as_final() {
        let mut response = tool_response("Here you go.", vec![("query_items", json!({}))]);
        response.echo = None;
        let provider = ScriptedProvider::new(vec![Ok(response)]);
        let orch = orchestrator(provider, 5);
        let mut session = Session::new(10);
        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("?"), &CancellationToken::new())
            .await;
        assert_eq!(reply.stop_reason, StopReason::Complete);
        assert!(reply.tool_calls.is_empty());
        assert_eq!(reply.final_text, "Here you go.");
    }

    #[tokio::test]
    async fn quota_error_apologizes_once_and_keeps_history() {
        let provider = ScriptedProvider::new(vec![Err(LlmError::QuotaError("429".into()))]);
        let registry = Arc::new(standard_registry(Arc::new(MemoryRecordStore::new()), None));
        let config = OrchestratorConfig::new("m").with_retry(RetryPolicy::default().with_base_delay_ms(1));
        let orch = Orchestrator::new(config, provider.clone(), registry);
        let mut session = Session::new(10);

        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("hi"), &CancellationToken::new())
            .await;

        assert_eq!(reply.stop_reason, StopReason::QuotaExceeded);
        assert_eq!(reply.final_text, QUOTA_APOLOGY);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(LlmError::RequestError("reset".into())),
            Err(LlmError::ProviderError("503".into())),
            Ok(ModelResponse::text("Back online.")),
        ]);
        let registry = Arc::new(standard_registry(Arc::new(MemoryRecordStore::new()), None));
        let config = OrchestratorConfig::new("m").with_retry(RetryPolicy::default().with_base_delay_ms(1));
        let orch = Orchestrator::new(config, provider.clone(), registry);
        let mut session = Session::new(10);

        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("hi"), &CancellationToken::new())
            .await;
        assert_eq!(reply.final_text, "Back online.");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn provider_error_gives_generic_apology() {
        let provider = ScriptedProvider::new(vec![Err(LlmError::AuthError("bad key".into()))]);
        let orch = orchestrator(provider, 5);
        let mut session = Session::new(10);
        let reply = orch
            .handle(&mut session, DialogueTurn::user_text("hi"), &CancellationToken::new())
            .await;
        assert_eq!(reply.stop_reason, StopReason::ProviderError);
        assert_eq!(reply.final_text, PROVIDER_APOLOGY);
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let provider = ScriptedProvider::new(vec![Ok(ModelResponse::text("never"))]);
        let orch = orchestrator(provider.clone(), 5);
        let mut session = Session::new(10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let reply = orch.handle(&mut session, DialogueTurn::user_text("hi"), &cancel).await;
        assert_eq!(reply.stop_reason, StopReason::Cancelled);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn history_window_applied_after_each_message() {
        let provider = ScriptedProvider::new(Vec::new());
        let orch = orchestrator(provider, 5);
        let mut session = Session::new(2);
        for n in 0..4 {
            orch.handle(&mut session, DialogueTurn::user_text(format!("q{n}")), &CancellationToken::new())
                .await;
        }
        assert_eq!(session.history.user_turn_count(), 2);
        assert_eq!(session.history.turns()[0].text(), "q2");
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        struct Slow;

        #[async_trait]
        impl ModelProvider for Slow {
            fn name(&self) -> &str {
                "slow"
            }
            async fn generate(&self, _r: &ModelRequest) -> Result<ModelResponse, LlmError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ModelResponse::text("late"))
            }
        }

        let registry = Arc::new(standard_registry(Arc::new(MemoryRecordStore::new()), None));
        let config = OrchestratorConfig::new("m")
            .with_retry(RetryPolicy::none())
            .with_request_timeout(Duration::from_millis(20));
        let orch = Orchestrator::new(config, Arc::new(Slow), registry);
        let reply = orch
            .handle(&mut Session::new(4), DialogueTurn::user_text("hi"), &CancellationToken::new())
            .await;
        assert_eq!(reply.stop_reason, StopReason::ProviderError);
    }
}
