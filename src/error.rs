//! Error types for the colloquy engine.

/// Top-level error type for the conversation engine.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Language model invocation error.
    #[error("LLM error: {0}")]
    Llm(#[from] crate::llm::error::LlmError),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio device or playback error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Record store error.
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// HTTP surface error.
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl SpeechError {
    /// Whether the synthesis provider rejected the request for quota or rate reasons.
    pub fn is_quota(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_quota(),
            Self::Tts(msg) => msg.contains("quota") || msg.contains("rate limit"),
            _ => false,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;
