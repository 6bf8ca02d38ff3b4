//! espeak-ng speech engine: one child process per utterance.
//!
//! Text goes in on stdin so it can never be mistaken for a flag. `cancel_all`
//! trips the current cancellation token, which kills every running child, and
//! installs a fresh token for later utterances.

use std::process::Stdio;
use std::sync::Mutex;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{SpeechEngine, SpeechErrorKind, Utterance, UtteranceEvents};
use super::settings::Voice;
use crate::config::SpeechConfig;
use crate::error::{Error, Result};

/// Voice used when none is selected.
const FALLBACK_VOICE: &str = "pl";

pub struct CommandSpeechEngine {
    program: String,
    base_wpm: u32,
    extra_args: Vec<String>,
    enabled: bool,
    cancel: Mutex<CancellationToken>,
}

impl CommandSpeechEngine {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            program: config.program.clone(),
            base_wpm: config.base_wpm,
            extra_args: config.extra_args.clone(),
            enabled: config.enabled,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Command-line arguments for one utterance, text excluded.
    pub fn args_for(&self, utterance: &Utterance) -> Vec<String> {
        let wpm = (self.base_wpm as f32 * utterance.rate).round().clamp(80.0, 500.0) as u32;
        let pitch = (utterance.pitch * 50.0).round().clamp(0.0, 99.0) as u32;
        let amplitude = (utterance.volume * 100.0).round().clamp(0.0, 200.0) as u32;
        let voice = utterance.voice.as_deref().unwrap_or(FALLBACK_VOICE);

        let mut args = vec![
            "-s".to_string(),
            wpm.to_string(),
            "-p".to_string(),
            pitch.to_string(),
            "-a".to_string(),
            amplitude.to_string(),
            "-v".to_string(),
            voice.to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push("--stdin".to_string());
        args
    }

    /// Voices reported by `<program> --voices`.
    pub async fn list_voices(&self) -> Result<Vec<Voice>> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Speech(format!("Failed to run {} --voices: {e}", self.program)))?;
        if !output.status.success() {
            return Err(Error::Speech(format!(
                "{} --voices exited with {}",
                self.program, output.status
            )));
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn synthesize(&self, utterance: Utterance, events: UtteranceEvents) {
        let token = self.cancel.lock().unwrap().clone();
        let mut command = Command::new(&self.program);
        command
            .args(self.args_for(&utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let program = self.program.clone();

        tokio::spawn(async move {
            if token.is_cancelled() {
                events.failed(SpeechErrorKind::Canceled);
                return;
            }

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!("Failed to start {program}: {e}");
                    events.failed(SpeechErrorKind::SynthesisFailed);
                    return;
                }
            };

            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(utterance.text.as_bytes()).await {
                    warn!("Failed to write utterance to {program}: {e}");
                }
                // Dropping stdin closes it so the program starts speaking.
            }
            events.started();
            debug!("{:?} started: {:?}", utterance.id, utterance.text);

            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => events.ended(),
                    Ok(status) => {
                        warn!("{program} exited with {status}");
                        events.failed(SpeechErrorKind::SynthesisFailed);
                    }
                    Err(e) => {
                        warn!("Failed to wait for {program}: {e}");
                        events.failed(SpeechErrorKind::SynthesisFailed);
                    }
                },
                _ = token.cancelled() => {
                    let _ = child.kill().await;
                    events.failed(SpeechErrorKind::Interrupted);
                }
            }
        });
    }

    fn cancel_all(&self) {
        let mut token = self.cancel.lock().unwrap();
        token.cancel();
        *token = CancellationToken::new();
        debug!("Speech cancelled");
    }

    fn is_available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match which::which(&self.program) {
            Ok(path) => {
                debug!("Speech program: {}", path.display());
                true
            }
            Err(_) => {
                info!("{} not found on PATH, read-aloud disabled", self.program);
                false
            }
        }
    }
}

/// Parse the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  pl              --/M      Polish             zle/pl
/// ```
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let gender = columns.next()?;
            let name = columns.next()?;
            let male = gender.ends_with("/M");
            Some(Voice {
                id: language.to_string(),
                name: if male {
                    format!("{} (male)", name.replace('_', " "))
                } else {
                    name.replace('_', " ")
                },
                language: language.to_string(),
            })
        })
        .collect()
}
