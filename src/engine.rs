//! Conversation engine facade.
//!
//! Owns the orchestrator, the per-session state and the speech pipeline.
//! New input stops any utterance still playing (barge-in), is resolved
//! through the orchestrator under its session's lock, and the reply is
//! handed to the speech pipeline without waiting for playback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{AgentReply, Orchestrator, OrchestratorConfig, Session, StopReason};
use crate::config::EngineConfig;
use crate::error::{Result, SpeechError};
use crate::llm::error::LlmError;
use crate::llm::gemini::{GeminiConfig, GeminiProvider};
use crate::llm::message::DialogueTurn;
use crate::llm::provider::{ModelProvider, ModelRequest};
use crate::store::{JsonFileStore, RecordStore};
use crate::stream::{ExtractorEvent, extract_objects};
use crate::tools::{ModelSearch, SemanticSearch, standard_registry};
use crate::tts::{SpeechPipeline, UtteranceHandle, build_pipeline, default_sink};

/// System instruction for structured streaming requests.
pub const STREAM_INSTRUCTION: &str = "Answer with one or more JSON objects and nothing else. \
     Emit each object as soon as it is complete.";

/// An image attached to a user message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// One user message addressed to a session.
#[derive(Debug, Clone)]
pub struct UserInput {
    /// Existing session, or `None` to start a new one.
    pub session_id: Option<Uuid>,
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl UserInput {
    pub fn text(session_id: Option<Uuid>, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    fn into_turn(self) -> DialogueTurn {
        match self.attachment {
            Some(a) => DialogueTurn::user_with_inline(self.text, a.mime_type, &a.bytes),
            None => DialogueTurn::user_text(self.text),
        }
    }
}

/// The engine's answer to one message.
#[derive(Debug)]
pub struct EngineReply {
    pub session_id: Uuid,
    pub reply: AgentReply,
    /// The utterance speaking `reply.final_text`, when speech is enabled.
    pub utterance: Option<UtteranceHandle>,
}

/// Orchestrator settings derived from the engine config.
pub fn orchestrator_config(config: &EngineConfig) -> OrchestratorConfig {
    let base = OrchestratorConfig::new(&config.model.model)
        .with_max_rounds(config.agent.max_rounds)
        .with_request_timeout(Duration::from_secs(config.model.timeout_secs))
        .with_retry(config.agent.retry.clone());
    match &config.model.system_instruction {
        Some(instruction) => base.with_system_instruction(Some(instruction.clone())),
        None => base,
    }
}

/// Build the production engine: Gemini provider, JSON file store and,
/// when `speak` is set and speech is enabled, the speech pipeline.
///
/// # Errors
///
/// Returns an error when no model API key is configured or the record
/// store cannot be opened.
pub async fn bootstrap(config: &EngineConfig, speak: bool) -> Result<ConversationEngine> {
    let api_key = config.model.resolve_api_key().ok_or_else(|| {
        SpeechError::Config(format!(
            "no model API key configured (set model.api_key or {})",
            config.model.api_key_env
        ))
    })?;
    let provider = GeminiProvider::new(
        GeminiConfig::new(api_key)
            .with_base_url(&config.model.base_url)
            .with_timeout(Duration::from_secs(config.model.timeout_secs)),
    )?;
    let store = JsonFileStore::open(&config.store.path)?;
    tracing::info!(path = %store.path().display(), model = %config.model.model, "engine starting");

    let engine = ConversationEngine::from_config(config, Arc::new(provider), Arc::new(store));
    if speak && config.speech.enabled {
        let pipeline = build_pipeline(&config.speech, default_sink(&config.speech)).await;
        return Ok(engine.with_speech(Arc::new(pipeline)));
    }
    Ok(engine)
}

/// Multi-session conversation engine.
pub struct ConversationEngine {
    orchestrator: Orchestrator,
    provider: Arc<dyn ModelProvider>,
    window: usize,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
    speech: Option<Arc<SpeechPipeline>>,
    shutdown: CancellationToken,
}

impl ConversationEngine {
    /// Create an engine around an orchestrator. `provider` serves streaming requests.
    pub fn new(orchestrator: Orchestrator, provider: Arc<dyn ModelProvider>, window: usize) -> Self {
        Self {
            orchestrator,
            provider,
            window: window.max(1),
            sessions: RwLock::new(HashMap::new()),
            speech: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire the standard tool set over `store` and build the engine from config.
    pub fn from_config(
        config: &EngineConfig,
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let search: Arc<dyn SemanticSearch> =
            Arc::new(ModelSearch::new(Arc::clone(&provider), &config.model.model));
        let registry = Arc::new(standard_registry(store, Some(search)));
        let orchestrator =
            Orchestrator::new(orchestrator_config(config), Arc::clone(&provider), registry);
        Self::new(orchestrator, provider, config.history.window)
    }

    pub fn with_speech(mut self, speech: Arc<SpeechPipeline>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn speech(&self) -> Option<&Arc<SpeechPipeline>> {
        self.speech.as_ref()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Resolve one user message and start speaking the reply.
    pub async fn handle_message(&self, input: UserInput) -> EngineReply {
        if let Some(speech) = &self.speech {
            speech.stop().await;
        }

        let (session_id, session) = self.session(input.session_id).await;
        let cancel = self.shutdown.child_token();
        let reply = {
            let mut session = session.lock().await;
            self.orchestrator
                .handle(&mut session, input.into_turn(), &cancel)
                .await
        };
        tracing::info!(
            %session_id,
            rounds = reply.rounds,
            stop_reason = %reply.stop_reason,
            tool_calls = reply.tool_calls.len(),
            "message resolved"
        );

        let utterance = match &self.speech {
            Some(speech) if reply.stop_reason != StopReason::Cancelled => {
                Some(speech.speak(&reply.final_text).await)
            }
            _ => None,
        };

        EngineReply {
            session_id,
            reply,
            utterance,
        }
    }

    /// Stream a prompt and extract JSON objects from the response as they complete.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the stream cannot be opened.
    pub async fn stream_objects(
        &self,
        prompt: &str,
    ) -> std::result::Result<impl Stream<Item = ExtractorEvent> + Send + use<>, LlmError> {
        let request = ModelRequest::new(
            &self.orchestrator.config().model,
            vec![DialogueTurn::user_text(prompt)],
        )
        .with_system_instruction(Some(STREAM_INSTRUCTION.to_owned()));
        let fragments = self.provider.stream_text(&request).await?;
        Ok(extract_objects(fragments))
    }

    /// Fetch a session, creating it when the id is unknown or absent.
    pub async fn session(&self, id: Option<Uuid>) -> (Uuid, Arc<Mutex<Session>>) {
        if let Some(id) = id
            && let Some(existing) = self.sessions.read().await.get(&id)
        {
            return (id, Arc::clone(existing));
        }

        let mut sessions = self.sessions.write().await;
        let id = id.unwrap_or_else(Uuid::new_v4);
        let session = sessions
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, "session created");
                Arc::new(Mutex::new(Session::with_id(id, self.window)))
            })
            .clone();
        (id, session)
    }

    /// Drop a session. Returns whether it existed.
    pub async fn end_session(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Cancel in-flight messages and stop speech.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(speech) = &self.speech {
            speech.stop().await;
        }
    }
}
