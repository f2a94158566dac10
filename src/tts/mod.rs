//! Speech output: normalization, chunking, synthesis and playback.

pub mod chunker;
pub mod http;
pub mod normalize;
pub mod pipeline;
#[cfg(feature = "playback")]
pub mod playback;
pub mod synth;
pub mod system_voice;
pub mod voice;

use std::sync::Arc;

pub use chunker::{ChunkLimits, chunk_text};
pub use http::{HttpSynthConfig, HttpSynthesizer};
pub use normalize::normalize_for_speech;
pub use pipeline::{PipelineSettings, SpeechEvent, SpeechPipeline, SpeechRoute, UtteranceHandle};
#[cfg(feature = "playback")]
pub use playback::CpalSink;
pub use synth::{AudioClip, AudioFormat, AudioSink, FallbackVoice, NullSink, Synthesizer};
pub use system_voice::{SpeechCommand, SystemVoice};
pub use voice::{VoiceCandidate, VoicePreference, select_voice};

use crate::config::SpeechOutputConfig;

/// The output device sink, or `None` when built without the `playback` feature.
pub fn default_sink(config: &SpeechOutputConfig) -> Option<Arc<dyn AudioSink>> {
    #[cfg(feature = "playback")]
    {
        Some(Arc::new(CpalSink::new(config.output_device.clone())))
    }
    #[cfg(not(feature = "playback"))]
    {
        let _ = config;
        None
    }
}

/// Assemble a pipeline from config.
///
/// The primary route needs a resolvable API key and an output sink; the
/// fallback route needs a speech command on `PATH`. Either may be missing,
/// in which case the pipeline runs with whatever is available.
pub async fn build_pipeline(
    config: &SpeechOutputConfig,
    sink: Option<Arc<dyn AudioSink>>,
) -> SpeechPipeline {
    let has_sink = sink.is_some();
    let sink: Arc<dyn AudioSink> = match sink {
        Some(sink) => sink,
        None => Arc::new(NullSink),
    };
    let mut pipeline = SpeechPipeline::new(sink, PipelineSettings::from(config));

    if has_sink {
        match HttpSynthConfig::from_speech_config(config).and_then(HttpSynthesizer::new) {
            Ok(synth) => pipeline = pipeline.with_primary(Arc::new(synth)),
            Err(e) => tracing::warn!(error = %e, "primary speech route unavailable"),
        }
    } else {
        tracing::warn!("no audio output sink, primary speech route disabled");
    }

    match SystemVoice::discover() {
        Some(voice) => {
            let voice = voice.choose_voice(&config.fallback_voice).await;
            pipeline = pipeline.with_fallback(Arc::new(voice));
        }
        None => tracing::warn!("no local speech command found, fallback voice disabled"),
    }

    pipeline
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn null_sink() -> Option<Arc<dyn AudioSink>> {
        Some(Arc::new(NullSink))
    }

    fn keyed_config() -> SpeechOutputConfig {
        SpeechOutputConfig {
            api_key: Some("tts-key".into()),
            ..SpeechOutputConfig::default()
        }
    }

    #[tokio::test]
    async fn primary_route_needs_a_sink() {
        let pipeline = build_pipeline(&keyed_config(), None).await;
        assert!(!pipeline.has_primary());
    }

    #[tokio::test]
    async fn primary_route_enabled_with_sink_and_key() {
        let pipeline = build_pipeline(&keyed_config(), null_sink()).await;
        assert!(pipeline.has_primary());
    }

    #[tokio::test]
    async fn primary_route_needs_a_key() {
        let config = SpeechOutputConfig {
            api_key: None,
            api_key_env: "COLLOQUY_TEST_NO_SUCH_SINK_KEY".into(),
            ..SpeechOutputConfig::default()
        };
        let pipeline = build_pipeline(&config, null_sink()).await;
        assert!(!pipeline.has_primary());
    }

    #[cfg(not(feature = "playback"))]
    #[test]
    fn no_default_sink_without_playback() {
        assert!(default_sink(&SpeechOutputConfig::default()).is_none());
    }
}
