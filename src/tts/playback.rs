//! PCM playback to the system output device via cpal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::synth::{AudioClip, AudioFormat, AudioSink};
use crate::error::{Result, SpeechError};

/// Poll interval while waiting for the output buffer to drain.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Audio sink that plays 16-bit PCM clips through cpal.
///
/// The device is opened per clip on a blocking thread because cpal streams
/// are not `Send`.
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    device_name: Option<String>,
}

impl CpalSink {
    /// Use the named output device, or the host default when `None`.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, clip: &AudioClip, cancel: &CancellationToken) -> Result<()> {
        let AudioFormat::Pcm16 { sample_rate } = clip.format else {
            return Err(SpeechError::Audio(
                "output device plays PCM only; set speech.output_format to pcm_<rate>".into(),
            ));
        };
        let samples = clip.pcm_samples().unwrap_or_default();
        let device_name = self.device_name.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let mut task = tokio::task::spawn_blocking(move || {
            play_blocking(device_name.as_deref(), samples, sample_rate, &worker_stop)
        });

        tokio::select! {
            () = cancel.cancelled() => {
                stop.store(true, Ordering::SeqCst);
                // The stream is dropped inside the task; wait so the device is silent on return.
                let _ = (&mut task).await;
                Ok(())
            }
            joined = &mut task => {
                joined.map_err(|e| SpeechError::Audio(format!("playback task failed: {e}")))?
            }
        }
    }
}

struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

fn open_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .is_some_and(|desc| desc.name() == name)
            })
            .ok_or_else(|| SpeechError::Audio(format!("output device '{name}' not found"))),
        None => host
            .default_output_device()
            .ok_or_else(|| SpeechError::Audio("no default output device".into())),
    }
}

/// Play `samples` and block until they drain or `stop` is set.
fn play_blocking(
    device_name: Option<&str>,
    samples: Vec<f32>,
    sample_rate: u32,
    stop: &AtomicBool,
) -> Result<()> {
    let device = open_device(device_name)?;
    let stream_config = StreamConfig {
        channels: 1,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };
    info!(sample_rate, samples = samples.len(), "playing clip");

    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples,
        position: 0,
        finished: false,
    }));
    let buffer_clone = Arc::clone(&buffer);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut buf = match buffer_clone.lock() {
                    Ok(b) => b,
                    Err(_) => return,
                };
                for sample in data.iter_mut() {
                    if buf.position < buf.samples.len() {
                        *sample = buf.samples[buf.position];
                        buf.position += 1;
                    } else {
                        *sample = 0.0;
                        buf.finished = true;
                    }
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| SpeechError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| SpeechError::Audio(format!("failed to start output stream: {e}")))?;

    loop {
        std::thread::sleep(DRAIN_POLL);
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let buf = buffer
            .lock()
            .map_err(|e| SpeechError::Audio(format!("playback buffer lock poisoned: {e}")))?;
        if buf.finished {
            break;
        }
    }

    drop(stream);
    Ok(())
}
