//! Configuration and result types for the orchestrator.
//!
//! Provides [`OrchestratorConfig`] for controlling loop behavior (round
//! limit, retries, system instruction) and [`AgentReply`] for capturing the
//! outcome of one user message including every executed tool call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tools::types::{ToolCall, ToolResult};

/// Default maximum number of model rounds per user message.
pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// Default maximum retry attempts for transient errors.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Default maximum delay for exponential backoff in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 8_000;

/// Default backoff multiplier.
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Used when the round budget runs out before the model produced any text.
pub const ROUND_LIMIT_PLACEHOLDER: &str =
    "I'm still working through that. Could you tell me a bit more about what you need?";

/// Spoken when the model provider reports quota exhaustion.
pub const QUOTA_APOLOGY: &str = "Sorry, I've run out of breath for the moment. \
     I've hit my usage limit, so please give me a little while and try again.";

/// Spoken when the model provider fails for any other reason.
pub const PROVIDER_APOLOGY: &str =
    "Sorry, I couldn't reach my thinking service just now. Please try again in a moment.";

/// Default system instruction.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly inventory assistant that \
     speaks out loud. Keep replies short and conversational. Use query_items to look things \
     up. To add an item, call stage_item with its details, confirm them with the user, ask \
     for the price and quantity, then call commit_item.";

/// Retry policy for transient model failures.
///
/// Exponential backoff with jitter. Only retryable errors are retried;
/// quota and auth failures never are.
///
/// # Examples
///
/// ```
/// use colloquy::agent::types::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = no retries).
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the delay in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_RETRY_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay in milliseconds.
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// `min(base * multiplier^(attempt-1), max)` plus up to 10% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self
            .backoff_multiplier
            .powi(i32::try_from(attempt - 1).unwrap_or(i32::MAX));
        let delay = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        let jitter = delay * (rand::random::<f64>() * 0.1);
        Duration::from_millis((delay + jitter) as u64)
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// System instruction sent with every request.
    pub system_instruction: Option<String>,
    /// Maximum rounds per user message.
    pub max_rounds: u32,
    /// Deadline for each provider call.
    pub request_timeout: Duration,
    /// Retry policy for transient errors.
    pub retry: RetryPolicy,
}

impl OrchestratorConfig {
    /// Create settings for `model` with defaults elsewhere.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            max_rounds: DEFAULT_MAX_ROUNDS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the round limit (minimum 1).
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Set or clear the system instruction.
    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Why the orchestrator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without requesting tools.
    Complete,
    /// The round budget ran out while tools were still being requested.
    MaxRounds,
    /// The provider reported quota exhaustion.
    QuotaExceeded,
    /// The provider failed for another reason.
    ProviderError,
    /// The message was cancelled.
    Cancelled,
}

impl StopReason {
    /// Whether the message's turns were committed to history.
    pub fn commits_history(self) -> bool {
        matches!(self, Self::Complete | Self::MaxRounds)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::MaxRounds => write!(f, "max_rounds"),
            Self::QuotaExceeded => write!(f, "quota_exceeded"),
            Self::ProviderError => write!(f, "provider_error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A dispatched call and its result.
#[derive(Debug, Clone)]
pub struct ExecutedToolCall {
    /// The call as requested.
    pub call: ToolCall,
    /// The text result fed back to the model.
    pub result: ToolResult,
}

/// The outcome of one user message.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Text to show or speak.
    pub final_text: String,
    /// Rounds used (model invocations).
    pub rounds: u32,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// Every executed call, in order.
    pub tool_calls: Vec<ExecutedToolCall>,
}
