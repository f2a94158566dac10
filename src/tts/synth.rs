//! Synthesis and playback seams of the speech pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Encoding of synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Compressed MPEG audio.
    Mp3,
    /// Raw signed 16-bit little-endian mono PCM.
    Pcm16 { sample_rate: u32 },
}

impl AudioFormat {
    /// Interpret a provider output-format string such as `pcm_24000` or `mp3_44100_128`.
    pub fn from_output_format(format: &str) -> Self {
        format
            .strip_prefix("pcm_")
            .and_then(|rate| rate.parse().ok())
            .map(|sample_rate| Self::Pcm16 { sample_rate })
            .unwrap_or(Self::Mp3)
    }
}

/// A synthesized chunk of audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub bytes: Bytes,
    pub format: AudioFormat,
}

impl AudioClip {
    pub fn new(bytes: impl Into<Bytes>, format: AudioFormat) -> Self {
        Self {
            bytes: bytes.into(),
            format,
        }
    }

    /// Decode PCM payloads to `f32` samples in `[-1.0, 1.0)`.
    ///
    /// Returns `None` for compressed formats. A trailing odd byte is ignored.
    pub fn pcm_samples(&self) -> Option<Vec<f32>> {
        match self.format {
            AudioFormat::Pcm16 { .. } => Some(
                self.bytes
                    .chunks_exact(2)
                    .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
                    .collect(),
            ),
            AudioFormat::Mp3 => None,
        }
    }

    /// Playback length for PCM audio.
    pub fn duration(&self) -> Option<std::time::Duration> {
        match self.format {
            AudioFormat::Pcm16 { sample_rate } if sample_rate > 0 => {
                let samples = self.bytes.len() / 2;
                Some(std::time::Duration::from_secs_f64(
                    samples as f64 / f64::from(sample_rate),
                ))
            }
            _ => None,
        }
    }
}

/// Primary, network-backed text-to-speech provider.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesize one chunk of text.
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

/// Plays clips from the primary synthesizer.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `clip` to completion, or stop early once `cancel` fires.
    async fn play(&self, clip: &AudioClip, cancel: &CancellationToken) -> Result<()>;
}

/// Local voice that synthesizes and plays in one step.
#[async_trait]
pub trait FallbackVoice: Send + Sync {
    fn name(&self) -> &str;

    /// Speak `text` to completion, or stop early once `cancel` fires.
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Sink that discards audio. Stands in when no output device is available,
/// in which case the primary route is never attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, clip: &AudioClip, _cancel: &CancellationToken) -> Result<()> {
        tracing::debug!(bytes = clip.bytes.len(), format = ?clip.format, "discarding audio clip");
        Ok(())
    }
}
