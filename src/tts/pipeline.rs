//! Utterance playback: normalize, chunk, synthesize, play.
//!
//! Each utterance runs in its own task over an explicit chunk queue. Chunks
//! are handled strictly one after another: synthesize chunk *i* on the
//! primary route (raced against a deadline), play it to completion, then
//! move on. The first primary failure switches the rest of the utterance to
//! the local fallback voice. Chunks already played are never repeated.
//!
//! One [`CancellationToken`] covers the whole utterance. Starting a new
//! utterance cancels the current one and waits for its task to finish, so
//! two utterances are never audible at once.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::chunker::{ChunkLimits, chunk_text};
use super::normalize::normalize_for_speech;
use super::synth::{AudioSink, FallbackVoice, Synthesizer};
use crate::config::SpeechOutputConfig;

/// Which route produced a chunk's audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechRoute {
    Primary,
    Fallback,
}

/// Progress notifications for one pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    UtteranceStarted {
        utterance_id: u64,
        chunks: usize,
    },
    ChunkStarted {
        utterance_id: u64,
        index: usize,
        route: SpeechRoute,
        text: String,
    },
    ChunkFinished {
        utterance_id: u64,
        index: usize,
        route: SpeechRoute,
    },
    /// A chunk could not be spoken on its route and was skipped.
    ChunkFailed {
        utterance_id: u64,
        index: usize,
        route: SpeechRoute,
        error: String,
    },
    /// The rest of the utterance moves to the fallback voice, starting at `index`.
    RouteSwitched {
        utterance_id: u64,
        index: usize,
        reason: String,
    },
    Completed {
        utterance_id: u64,
    },
    Cancelled {
        utterance_id: u64,
    },
}

/// Timing and chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Deadline for the first chunk's synthesis, covering provider cold start.
    pub first_chunk_timeout: Duration,
    /// Deadline for every later chunk.
    pub later_chunk_timeout: Duration,
    pub limits: ChunkLimits,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            first_chunk_timeout: Duration::from_millis(8_000),
            later_chunk_timeout: Duration::from_millis(4_000),
            limits: ChunkLimits::default(),
        }
    }
}

impl From<&SpeechOutputConfig> for PipelineSettings {
    fn from(config: &SpeechOutputConfig) -> Self {
        Self {
            first_chunk_timeout: Duration::from_millis(config.first_chunk_timeout_ms),
            later_chunk_timeout: Duration::from_millis(config.later_chunk_timeout_ms),
            limits: ChunkLimits::new(config.long_segment_chars, config.max_segment_chars),
        }
    }
}

/// Handle to a running utterance.
#[derive(Debug, Clone)]
pub struct UtteranceHandle {
    id: u64,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl UtteranceHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait until the utterance task has stopped all network and audio work.
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        // A dropped sender means the task is gone, which is just as final.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Sequential speech output with fallback and barge-in.
pub struct SpeechPipeline {
    primary: Option<Arc<dyn Synthesizer>>,
    sink: Arc<dyn AudioSink>,
    fallback: Option<Arc<dyn FallbackVoice>>,
    settings: PipelineSettings,
    events: Option<mpsc::UnboundedSender<SpeechEvent>>,
    current: Mutex<Option<UtteranceHandle>>,
    next_id: AtomicU64,
}

impl SpeechPipeline {
    pub fn new(sink: Arc<dyn AudioSink>, settings: PipelineSettings) -> Self {
        Self {
            primary: None,
            sink,
            fallback: None,
            settings,
            events: None,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_primary(mut self, primary: Arc<dyn Synthesizer>) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackVoice>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Report progress on `events`. Send failures are ignored.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SpeechEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Start speaking `text`, cancelling whatever is currently playing.
    ///
    /// Returns once the previous utterance has fully stopped and the new
    /// one is running.
    pub async fn speak(&self, text: &str) -> UtteranceHandle {
        let chunks = chunk_text(&normalize_for_speech(text), &self.settings.limits);

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.cancel();
            previous.wait().await;
            tracing::debug!(utterance_id = previous.id(), "previous utterance stopped");
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let handle = UtteranceHandle {
            id,
            cancel: cancel.clone(),
            done: done_rx,
        };

        let run = Utterance {
            id,
            primary: self.primary.clone(),
            sink: Arc::clone(&self.sink),
            fallback: self.fallback.clone(),
            settings: self.settings,
            events: self.events.clone(),
            cancel,
        };
        let span = tracing::info_span!("utterance", utterance_id = id, chunks = chunks.len());
        tokio::spawn(
            async move {
                run.play(chunks).await;
                let _ = done_tx.send(true);
            }
            .instrument(span),
        );

        *current = Some(handle.clone());
        handle
    }

    /// Cancel the current utterance, if any, and wait for it to stop.
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.cancel();
            previous.wait().await;
        }
    }
}

/// Everything one utterance task needs.
struct Utterance {
    id: u64,
    primary: Option<Arc<dyn Synthesizer>>,
    sink: Arc<dyn AudioSink>,
    fallback: Option<Arc<dyn FallbackVoice>>,
    settings: PipelineSettings,
    events: Option<mpsc::UnboundedSender<SpeechEvent>>,
    cancel: CancellationToken,
}

enum ChunkOutcome {
    Spoken,
    /// Primary route failed before the chunk was heard.
    Failover(String),
    Failed(String),
    Cancelled,
}

impl Utterance {
    async fn play(self, chunks: Vec<String>) {
        self.emit(SpeechEvent::UtteranceStarted {
            utterance_id: self.id,
            chunks: chunks.len(),
        });

        let mut queue: VecDeque<(usize, String)> = chunks.into_iter().enumerate().collect();
        let mut route = if self.primary.is_some() {
            SpeechRoute::Primary
        } else {
            SpeechRoute::Fallback
        };

        while let Some((index, text)) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                self.emit(SpeechEvent::Cancelled {
                    utterance_id: self.id,
                });
                return;
            }

            self.emit(SpeechEvent::ChunkStarted {
                utterance_id: self.id,
                index,
                route,
                text: text.clone(),
            });
            let outcome = match route {
                SpeechRoute::Primary => self.speak_primary(index, &text).await,
                SpeechRoute::Fallback => self.speak_fallback(&text).await,
            };

            match outcome {
                ChunkOutcome::Spoken => {
                    tracing::debug!(chunk_index = index, ?route, "chunk spoken");
                    self.emit(SpeechEvent::ChunkFinished {
                        utterance_id: self.id,
                        index,
                        route,
                    });
                }
                ChunkOutcome::Failover(reason) => {
                    tracing::warn!(chunk_index = index, %reason, "primary speech failed, switching to fallback voice");
                    self.emit(SpeechEvent::RouteSwitched {
                        utterance_id: self.id,
                        index,
                        reason,
                    });
                    route = SpeechRoute::Fallback;
                    queue.push_front((index, text));
                }
                ChunkOutcome::Failed(error) => {
                    tracing::warn!(chunk_index = index, ?route, %error, "chunk skipped");
                    self.emit(SpeechEvent::ChunkFailed {
                        utterance_id: self.id,
                        index,
                        route,
                        error,
                    });
                }
                ChunkOutcome::Cancelled => {
                    tracing::debug!(chunk_index = index, "utterance cancelled");
                    self.emit(SpeechEvent::Cancelled {
                        utterance_id: self.id,
                    });
                    return;
                }
            }
        }

        self.emit(SpeechEvent::Completed {
            utterance_id: self.id,
        });
    }

    async fn speak_primary(&self, index: usize, text: &str) -> ChunkOutcome {
        let Some(primary) = self.primary.as_ref() else {
            return ChunkOutcome::Failover("no primary synthesizer".into());
        };
        let deadline = if index == 0 {
            self.settings.first_chunk_timeout
        } else {
            self.settings.later_chunk_timeout
        };

        let synthesized = tokio::select! {
            () = self.cancel.cancelled() => return ChunkOutcome::Cancelled,
            result = tokio::time::timeout(deadline, primary.synthesize(text)) => result,
        };
        let clip = match synthesized {
            Ok(Ok(clip)) => clip,
            Ok(Err(e)) => return ChunkOutcome::Failover(e.to_string()),
            Err(_) => {
                return ChunkOutcome::Failover(format!(
                    "{} synthesis timed out after {} ms",
                    primary.name(),
                    deadline.as_millis()
                ));
            }
        };

        let played = self.sink.play(&clip, &self.cancel).await;
        if self.cancel.is_cancelled() {
            return ChunkOutcome::Cancelled;
        }
        match played {
            Ok(()) => ChunkOutcome::Spoken,
            Err(e) => ChunkOutcome::Failover(format!("playback failed: {e}")),
        }
    }

    async fn speak_fallback(&self, text: &str) -> ChunkOutcome {
        let Some(fallback) = self.fallback.as_ref() else {
            return ChunkOutcome::Failed("no fallback voice available".into());
        };
        let spoken = fallback.speak(text, &self.cancel).await;
        if self.cancel.is_cancelled() {
            return ChunkOutcome::Cancelled;
        }
        match spoken {
            Ok(()) => ChunkOutcome::Spoken,
            Err(e) => ChunkOutcome::Failed(e.to_string()),
        }
    }

    fn emit(&self, event: SpeechEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{Result, SpeechError};
    use crate::tts::synth::{AudioClip, AudioFormat, NullSink};

    /// Primary synthesizer that sleeps for `delay` on chunks whose index is in `slow`.
    struct SlowSynth {
        slow: Vec<usize>,
        delay: Duration,
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Synthesizer for SlowSynth {
        fn name(&self) -> &str {
            "slow"
        }

        async fn synthesize(&self, text: &str) -> Result<AudioClip> {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(text.to_owned());
                calls.len() - 1
            };
            if self.slow.contains(&index) {
                tokio::time::sleep(self.delay).await;
            }
            Ok(AudioClip::new(text.as_bytes().to_vec(), AudioFormat::Mp3))
        }
    }

    struct FailingSynth;

    #[async_trait]
    impl Synthesizer for FailingSynth {
        fn name(&self) -> &str {
            "failing"
        }

        async fn synthesize(&self, _text: &str) -> Result<AudioClip> {
            Err(SpeechError::Tts("quota exceeded: no credits".into()))
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SpeechEvent>) -> Vec<SpeechEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn settings(first_ms: u64, later_ms: u64) -> PipelineSettings {
        PipelineSettings {
            first_chunk_timeout: Duration::from_millis(first_ms),
            later_chunk_timeout: Duration::from_millis(later_ms),
            limits: ChunkLimits::default(),
        }
    }

    #[tokio::test]
    async fn later_chunks_use_the_shorter_deadline() {
        let synth = Arc::new(SlowSynth {
            slow: vec![0, 1],
            delay: Duration::from_millis(150),
            calls: StdMutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = SpeechPipeline::new(Arc::new(NullSink), settings(2_000, 50))
            .with_primary(synth.clone())
            .with_events(tx);

        let handle = pipeline.speak("One! Two! Three!").await;
        handle.wait().await;

        let events = drain(&mut rx);
        assert!(events.contains(&SpeechEvent::ChunkFinished {
            utterance_id: handle.id(),
            index: 0,
            route: SpeechRoute::Primary,
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            SpeechEvent::RouteSwitched { index: 1, reason, .. } if reason.contains("timed out")
        )));
        // No fallback voice: the remaining chunks are reported as failed.
        let failed: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SpeechEvent::ChunkFailed { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![1, 2]);
        assert_eq!(synth.calls.lock().unwrap().len(), 2);
        assert!(matches!(events.last(), Some(SpeechEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn failure_on_first_chunk_switches_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = SpeechPipeline::new(Arc::new(NullSink), PipelineSettings::default())
            .with_primary(Arc::new(FailingSynth))
            .with_events(tx);
        pipeline.speak("Hello there!").await.wait().await;

        let events = drain(&mut rx);
        assert!(matches!(
            &events[2],
            SpeechEvent::RouteSwitched { index: 0, reason, .. } if reason.contains("quota")
        ));
    }

    #[tokio::test]
    async fn empty_text_completes_without_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline =
            SpeechPipeline::new(Arc::new(NullSink), PipelineSettings::default()).with_events(tx);
        let handle = pipeline.speak("```\nonly code\n```").await;
        handle.wait().await;
        assert!(handle.is_finished());
        assert_eq!(
            drain(&mut rx),
            vec![
                SpeechEvent::UtteranceStarted {
                    utterance_id: handle.id(),
                    chunks: 0
                },
                SpeechEvent::Completed {
                    utterance_id: handle.id()
                },
            ]
        );
    }

    #[tokio::test]
    async fn stop_cancels_running_utterance() {
        let synth = Arc::new(SlowSynth {
            slow: vec![0],
            delay: Duration::from_secs(30),
            calls: StdMutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = SpeechPipeline::new(Arc::new(NullSink), settings(60_000, 60_000))
            .with_primary(synth)
            .with_events(tx);

        let handle = pipeline.speak("A long wait.").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        pipeline.stop().await;
        assert!(handle.is_finished());
        assert!(matches!(
            drain(&mut rx).last(),
            Some(SpeechEvent::Cancelled { .. })
        ));
    }

    #[test]
    fn settings_from_config() {
        let config = SpeechOutputConfig::default();
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.first_chunk_timeout, Duration::from_millis(8_000));
        assert_eq!(settings.later_chunk_timeout, Duration::from_millis(4_000));
        assert_eq!(settings.limits, ChunkLimits::new(200, 150));
    }
}
