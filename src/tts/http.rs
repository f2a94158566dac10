//! Network text-to-speech over an ElevenLabs-compatible HTTP API.
//!
//! `POST {base}/v1/text-to-speech/{voice_id}?output_format=...` with the key in
//! `xi-api-key` and a JSON body carrying the text, model id and voice
//! settings. The response body is the encoded audio.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::synth::{AudioClip, AudioFormat, Synthesizer};
use crate::config::{SpeechOutputConfig, VoiceSettings};
use crate::error::{Result, SpeechError};

/// Upper bound on a single synthesis request. The pipeline applies its own,
/// shorter per-chunk deadlines on top of this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`HttpSynthesizer`].
#[derive(Debug, Clone)]
pub struct HttpSynthConfig {
    pub base_url: String,
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    pub output_format: String,
    pub voice_settings: VoiceSettings,
}

impl HttpSynthConfig {
    /// Build from the speech section of the engine config.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] when no API key can be resolved.
    pub fn from_speech_config(config: &SpeechOutputConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            SpeechError::Config(format!(
                "no speech API key configured (set speech.api_key or {})",
                config.api_key_env
            ))
        })?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            output_format: config.output_format.clone(),
            voice_settings: config.voice_settings.clone(),
        })
    }

    /// Set the base URL (useful for testing with mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// Primary synthesizer backed by a hosted TTS API.
pub struct HttpSynthesizer {
    config: HttpSynthConfig,
    format: AudioFormat,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] if the HTTP client cannot be built.
    pub fn new(config: HttpSynthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SpeechError::Config(format!("failed to build HTTP client: {e}")))?;
        let format = AudioFormat::from_output_format(&config.output_format);
        Ok(Self {
            config,
            format,
            client,
        })
    }

    pub fn config(&self) -> &HttpSynthConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url, self.config.voice_id
        )
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    fn name(&self) -> &str {
        "http"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let body = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: &self.config.voice_settings,
        };
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("output_format", self.config.output_format.as_str())])
            .header("xi-api-key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "audio/*")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpeechError::Tts(format!("synthesis request timed out: {e}"))
                } else {
                    SpeechError::Tts(format!("synthesis request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Tts(format!("failed to read audio body: {e}")))?;
        if bytes.is_empty() {
            return Err(SpeechError::Tts("provider returned empty audio".into()));
        }
        tracing::debug!(bytes = bytes.len(), chars = text.len(), "synthesized chunk");
        Ok(AudioClip::new(bytes, self.format))
    }
}

/// Map a non-success synthesis response to an error.
///
/// 429 and `quota_exceeded` bodies map to a quota error so callers can tell
/// them apart from transient failures.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> SpeechError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail_status = parsed
        .as_ref()
        .and_then(|v| v.pointer("/detail/status"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let detail = parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/detail/message")
                .or_else(|| v.get("detail"))
                .and_then(Value::as_str)
        })
        .map(String::from)
        .unwrap_or_else(|| body.chars().take(300).collect());

    match status.as_u16() {
        429 => SpeechError::Tts(format!("quota exceeded: {detail}")),
        _ if detail_status == "quota_exceeded" => {
            SpeechError::Tts(format!("quota exceeded: {detail}"))
        }
        401 | 403 => SpeechError::Tts(format!("authentication failed: {detail}")),
        code => SpeechError::Tts(format!("HTTP {code}: {detail}")),
    }
}
