//! Configuration types for the conversation engine.
//!
//! Configuration lives in a single TOML file. Every section is
//! `#[serde(default)]`, so a missing file or a partial file yields working
//! defaults. Writes are atomic (temp file, fsync, rename).

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::types::RetryPolicy;
use crate::error::{Result, SpeechError};
use crate::tts::voice::VoicePreference;

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model backend settings.
    pub model: ModelConfig,
    /// Orchestrator settings.
    pub agent: AgentConfig,
    /// Dialogue history settings.
    pub history: HistoryConfig,
    /// Speech output settings.
    pub speech: SpeechOutputConfig,
    /// Record store settings.
    pub store: StoreConfig,
    /// HTTP surface settings.
    pub server: ServerConfig,
}

/// Model backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider base URL.
    pub base_url: String,
    /// Inline API key. Prefer `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model identifier.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// System instruction override. `None` uses the built-in instruction.
    pub system_instruction: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_owned(),
            model: "gemini-2.0-flash".to_owned(),
            timeout_secs: 60,
            system_instruction: None,
        }
    }
}

impl ModelConfig {
    /// The API key, from the inline value or the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum model rounds per user message.
    pub max_rounds: u32,
    /// Retry policy for transient model errors.
    pub retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// Dialogue history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of user turns kept.
    pub window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { window: 10 }
    }
}

/// Voice-setting overrides sent with each synthesis request.
///
/// Unset fields are omitted so the provider applies its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Voice stability (0.0–1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f32>,
    /// Similarity boost (0.0–1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f32>,
    /// Style exaggeration (0.0–1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<f32>,
    /// Speaking rate multiplier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    /// Speaker boost toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_speaker_boost: Option<bool>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: Some(0.5),
            similarity_boost: Some(0.75),
            style: None,
            speed: None,
            use_speaker_boost: None,
        }
    }
}

/// Speech output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechOutputConfig {
    /// Whether final replies are spoken.
    pub enabled: bool,
    /// Primary synthesis endpoint base URL.
    pub base_url: String,
    /// Inline API key. Prefer `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Voice identifier.
    pub voice_id: String,
    /// Synthesis model identifier.
    pub model_id: String,
    /// Provider output format, e.g. `pcm_24000` or `mp3_44100_128`.
    pub output_format: String,
    /// Voice-setting overrides.
    pub voice_settings: VoiceSettings,
    /// Timeout for the first chunk of an utterance.
    pub first_chunk_timeout_ms: u64,
    /// Timeout for every later chunk.
    pub later_chunk_timeout_ms: u64,
    /// Segments longer than this are split on commas and semicolons.
    pub long_segment_chars: usize,
    /// Upper bound for packed sub-segments.
    pub max_segment_chars: usize,
    /// Preference used to pick the local fallback voice.
    pub fallback_voice: VoicePreference,
    /// Output device name. `None` uses the host default.
    pub output_device: Option<String>,
}

impl Default for SpeechOutputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.elevenlabs.io".to_owned(),
            api_key: None,
            api_key_env: "ELEVENLABS_API_KEY".to_owned(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_owned(),
            model_id: "eleven_turbo_v2_5".to_owned(),
            output_format: "pcm_24000".to_owned(),
            voice_settings: VoiceSettings::default(),
            first_chunk_timeout_ms: 8_000,
            later_chunk_timeout_ms: 4_000,
            long_segment_chars: 200,
            max_segment_chars: 150,
            fallback_voice: VoicePreference::default(),
            output_device: None,
        }
    }
}

impl SpeechOutputConfig {
    /// The API key, from the inline value or the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON data file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("records.json"),
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
        }
    }
}

impl EngineConfig {
    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.history.window == 0 {
            return Err(SpeechError::Config("history.window must be > 0".into()));
        }
        if self.agent.max_rounds == 0 {
            return Err(SpeechError::Config("agent.max_rounds must be > 0".into()));
        }
        let speech = &self.speech;
        if speech.long_segment_chars == 0 || speech.max_segment_chars == 0 {
            return Err(SpeechError::Config(
                "speech chunk bounds must be > 0".into(),
            ));
        }
        if speech.max_segment_chars > speech.long_segment_chars {
            return Err(SpeechError::Config(format!(
                "speech.max_segment_chars ({}) exceeds speech.long_segment_chars ({})",
                speech.max_segment_chars, speech.long_segment_chars
            )));
        }
        if speech.first_chunk_timeout_ms == 0 || speech.later_chunk_timeout_ms == 0 {
            return Err(SpeechError::Config(
                "speech chunk timeouts must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file.
///
/// A missing file yields defaults. The loaded config is validated.
///
/// # Errors
///
/// Returns [`SpeechError::Config`] if the file cannot be read, parsed, or validated.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SpeechError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            SpeechError::Config(format!(
                "failed to parse config file '{}': {e}",
                path.display()
            ))
        })?
    } else {
        tracing::debug!(path = %path.display(), "config file missing, using defaults");
        EngineConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Write configuration atomically (temp file, fsync, rename).
///
/// # Errors
///
/// Returns [`SpeechError::Config`] on serialization, write, or rename failure.
pub fn save_config_atomic(path: &Path, config: &EngineConfig) -> Result<()> {
    let text = toml::to_string_pretty(config)
        .map_err(|e| SpeechError::Config(format!("failed to serialize config: {e}")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SpeechError::Config(format!(
                "failed to create config directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        SpeechError::Config(format!(
            "failed to create temp file '{}': {e}",
            tmp_path.display()
        ))
    })?;
    file.write_all(text.as_bytes())
        .map_err(|e| SpeechError::Config(format!("failed to write temp file: {e}")))?;
    file.sync_all()
        .map_err(|e| SpeechError::Config(format!("failed to sync temp file: {e}")))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        SpeechError::Config(format!(
            "failed to rename '{}' to '{}': {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}

/// Returns the default config file path: `<config dir>/colloquy/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::env::temp_dir().join("colloquy-config"))
        .join("colloquy")
        .join("config.toml")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("colloquy")
}

fn resolve_secret(inline: Option<&str>, env_var: &str) -> Option<String> {
    if let Some(key) = inline
        && !key.trim().is_empty()
    {
        return Some(key.to_owned());
    }
    if env_var.is_empty() {
        return None;
    }
    std::env::var(env_var).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_rounds, 5);
        assert_eq!(config.history.window, 10);
        assert_eq!(config.speech.first_chunk_timeout_ms, 8_000);
        assert_eq!(config.speech.later_chunk_timeout_ms, 4_000);
        assert_eq!(config.speech.long_segment_chars, 200);
        assert_eq!(config.speech.max_segment_chars, 150);
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut config = EngineConfig::default();
        config.history.window = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("history.window"));
    }

    #[test]
    fn validate_rejects_zero_rounds() {
        let mut config = EngineConfig::default();
        config.agent.max_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_chunk_bounds() {
        let mut config = EngineConfig::default();
        config.speech.max_segment_chars = 300;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_segment_chars"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = EngineConfig::default();
        config.history.window = 3;
        config.speech.voice_id = "narrator".into();
        config.model.system_instruction = Some("Keep it short.".into());
        save_config_atomic(&path, &config).unwrap();
        assert!(!path.with_extension("toml.tmp").exists());

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.history.window, 3);
        assert_eq!(loaded.speech.voice_id, "narrator");
        assert_eq!(
            loaded.model.system_instruction.as_deref(),
            Some("Keep it short.")
        );
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_rounds = 2\n").unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.agent.max_rounds, 2);
        assert_eq!(loaded.history.window, 10);
        assert_eq!(loaded.agent.retry.max_attempts, 3);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "{{{{not toml").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, SpeechError::Config(_)));
    }

    #[test]
    fn invalid_values_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[history]\nwindow = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn inline_key_wins_over_env() {
        let mut model = ModelConfig::default();
        model.api_key = Some("inline".into());
        model.api_key_env = "COLLOQUY_TEST_UNSET_VARIABLE".into();
        assert_eq!(model.resolve_api_key().as_deref(), Some("inline"));
    }

    #[test]
    fn blank_inline_key_and_unset_env_resolve_to_none() {
        let mut speech = SpeechOutputConfig::default();
        speech.api_key = Some("   ".into());
        speech.api_key_env = "COLLOQUY_TEST_UNSET_VARIABLE".into();
        assert!(speech.resolve_api_key().is_none());
    }

    #[test]
    fn voice_settings_skip_unset_fields() {
        let json = serde_json::to_value(VoiceSettings::default()).unwrap();
        assert_eq!(json["stability"], 0.5);
        assert!(json.get("speed").is_none());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = default_config_path();
        assert!(path.ends_with("colloquy/config.toml"));
    }
}
