//! Local fallback voice through the operating system's speech command.
//!
//! `say` on macOS, `espeak-ng` or `espeak` elsewhere. The command both
//! synthesizes and plays, so one process per chunk is the whole fallback
//! route. Processes are spawned with `kill_on_drop` and killed on
//! cancellation, which stops the audio with them.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::synth::FallbackVoice;
use super::voice::{VoiceCandidate, VoicePreference, select_voice};
use crate::error::{Result, SpeechError};

/// Which speech command family a binary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechCommand {
    Say,
    EspeakNg,
    Espeak,
}

impl SpeechCommand {
    /// Lookup order used by [`SystemVoice::discover`].
    pub const SEARCH_ORDER: [Self; 3] = [Self::Say, Self::EspeakNg, Self::Espeak];

    pub fn binary(self) -> &'static str {
        match self {
            Self::Say => "say",
            Self::EspeakNg => "espeak-ng",
            Self::Espeak => "espeak",
        }
    }

    /// Arguments that make the command speak `text`.
    pub fn speak_args(self, voice: Option<&str>, text: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(3);
        if let Some(voice) = voice {
            args.push("-v".to_owned());
            args.push(voice.to_owned());
        }
        args.push(text.to_owned());
        args
    }

    /// Arguments that make the command list its installed voices.
    pub fn list_args(self) -> &'static [&'static str] {
        match self {
            Self::Say => &["-v", "?"],
            Self::EspeakNg | Self::Espeak => &["--voices"],
        }
    }

    pub fn parse_voices(self, output: &str) -> Vec<VoiceCandidate> {
        match self {
            Self::Say => parse_say_voices(output),
            Self::EspeakNg | Self::Espeak => parse_espeak_voices(output),
        }
    }
}

/// Fallback voice backed by a local speech binary.
#[derive(Debug, Clone)]
pub struct SystemVoice {
    program: PathBuf,
    command: SpeechCommand,
    voice: Option<String>,
}

impl SystemVoice {
    pub fn new(program: impl Into<PathBuf>, command: SpeechCommand) -> Self {
        Self {
            program: program.into(),
            command,
            voice: None,
        }
    }

    /// Find the first speech command on `PATH`.
    pub fn discover() -> Option<Self> {
        SpeechCommand::SEARCH_ORDER.into_iter().find_map(|command| {
            which::which(command.binary())
                .ok()
                .map(|path| Self::new(path, command))
        })
    }

    /// Use a specific engine voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    /// Ask the engine for its installed voices.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Tts`] when the command cannot run or exits non-zero.
    pub async fn list_voices(&self) -> Result<Vec<VoiceCandidate>> {
        let output = Command::new(&self.program)
            .args(self.command.list_args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SpeechError::Tts(format!("failed to run {}: {e}", self.program.display()))
            })?;
        if !output.status.success() {
            return Err(SpeechError::Tts(format!(
                "{} voice listing exited with {}",
                self.command.binary(),
                output.status
            )));
        }
        Ok(self
            .command
            .parse_voices(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Pick the best installed voice for `preference`.
    ///
    /// Keeps the engine default when listing fails or nothing is installed.
    pub async fn choose_voice(mut self, preference: &VoicePreference) -> Self {
        match self.list_voices().await {
            Ok(candidates) => {
                if let Some(best) = select_voice(&candidates, preference) {
                    tracing::info!(voice = %best.name, engine = self.command.binary(), "selected fallback voice");
                    self.voice = Some(best.name.clone());
                }
            }
            Err(e) => tracing::warn!(error = %e, "voice listing failed, using engine default"),
        }
        self
    }
}

#[async_trait]
impl FallbackVoice for SystemVoice {
    fn name(&self) -> &str {
        self.command.binary()
    }

    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.command.speak_args(self.voice.as_deref(), text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpeechError::Tts(format!("failed to spawn {}: {e}", self.program.display()))
            })?;

        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "speech process already gone");
                }
                Ok(())
            }
            status = child.wait() => {
                let status = status.map_err(|e| SpeechError::Audio(format!("speech process failed: {e}")))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(SpeechError::Audio(format!(
                        "{} exited with {status}",
                        self.command.binary()
                    )))
                }
            }
        }
    }
}

/// Parse `say -v '?'` output: `Name   en_US    # sample sentence`.
pub fn parse_say_voices(output: &str) -> Vec<VoiceCandidate> {
    output
        .lines()
        .filter_map(|line| {
            let spec = line.split('#').next()?.trim_end();
            let (name, language) = spec.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || !looks_like_language(language) {
                return None;
            }
            Some(VoiceCandidate::new(name, language))
        })
        .collect()
}

/// Parse `espeak-ng --voices` output.
///
/// Columns are priority, language, age/gender, voice name and file. The
/// language code is what `-v` accepts, so it becomes the candidate name and
/// the descriptive voice name becomes a tag.
pub fn parse_espeak_voices(output: &str) -> Vec<VoiceCandidate> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let age_gender = columns.next()?;
            let voice_name = columns.next()?;

            let mut tags = vec![voice_name.to_lowercase()];
            match age_gender.rsplit('/').next() {
                Some("M") => tags.push("male".to_owned()),
                Some("F") => tags.push("female".to_owned()),
                _ => {}
            }
            Some(VoiceCandidate::new(language, language).with_tags(tags))
        })
        .collect()
}

fn looks_like_language(token: &str) -> bool {
    let mut parts = token.split(['_', '-']);
    parts
        .next()
        .is_some_and(|base| (2..=3).contains(&base.len()) && base.chars().all(|c| c.is_ascii_alphabetic()))
}
