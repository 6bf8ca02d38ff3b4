//! Voice settings, the voice catalogue and the persisted settings store.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::VoiceConfig;
use crate::error::Result;

/// Words in a voice name that suggest a male speaker.
const MALE_HINTS: [&str; 5] = ["male", "męski", "adam", "mężczyzna", "jacek"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub pause_duration_ms: u64,
    pub voice: Option<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            pause_duration_ms: 300,
            voice: None,
        }
    }
}

impl VoiceSettings {
    pub fn from_config(config: &VoiceConfig) -> Self {
        let mut settings = Self {
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
            pause_duration_ms: config.pause_duration_ms,
            voice: config.voice.clone(),
        };
        settings.clamp();
        settings
    }

    /// True if an utterance spoken with `self` would sound different from one
    /// spoken with `other`. The pause is not part of an utterance.
    pub fn affects_speech(&self, other: &Self) -> bool {
        self.rate != other.rate
            || self.pitch != other.pitch
            || self.volume != other.volume
            || self.voice != other.voice
    }

    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(rate) = update.rate {
            self.rate = rate;
        }
        if let Some(pitch) = update.pitch {
            self.pitch = pitch;
        }
        if let Some(volume) = update.volume {
            self.volume = volume;
        }
        if let Some(pause) = update.pause_duration_ms {
            self.pause_duration_ms = pause;
        }
        if let Some(voice) = &update.voice {
            self.voice = (!voice.is_empty()).then(|| voice.clone());
        }
        self.clamp();
    }

    fn clamp(&mut self) {
        self.rate = self.rate.clamp(0.1, 10.0);
        self.pitch = self.pitch.clamp(0.0, 2.0);
        self.volume = self.volume.clamp(0.0, 1.0);
    }
}

/// Partial settings change. Missing fields keep their value; an empty
/// `voice` clears the selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
    pub pause_duration_ms: Option<u64>,
    pub voice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voice {
    /// Identifier the engine accepts (`-v` for espeak-ng).
    pub id: String,
    pub name: String,
    /// BCP 47 style tag, e.g. `pl` or `en-GB`.
    pub language: String,
}

impl Voice {
    fn is_polish(&self) -> bool {
        self.language.starts_with("pl")
    }

    fn is_english(&self) -> bool {
        self.language.starts_with("en")
    }
}

/// Polish voices first, then English. Everything else is dropped.
pub fn filter_voices(voices: &[Voice]) -> Vec<Voice> {
    voices
        .iter()
        .filter(|v| v.is_polish())
        .chain(voices.iter().filter(|v| v.is_english()))
        .cloned()
        .collect()
}

/// Pick the voice to use when the user has not chosen one this session.
pub fn choose_default_voice(voices: &[Voice], saved: Option<&str>) -> Option<String> {
    let offered = filter_voices(voices);

    if let Some(saved) = saved {
        if offered.iter().any(|v| v.id == saved) {
            return Some(saved.to_string());
        }
    }

    let polish: Vec<&Voice> = offered.iter().filter(|v| v.is_polish()).collect();
    let male = polish.iter().find(|v| {
        let name = v.name.to_lowercase();
        MALE_HINTS.iter().any(|hint| name.contains(hint))
    });

    male.or(polish.first())
        .copied()
        .or(offered.first())
        .map(|v| v.id.clone())
}

/// Process-wide voice settings.
///
/// Readers subscribe to the watch channel; every update is persisted when the
/// store has a file.
pub struct SettingsStore {
    tx: watch::Sender<VoiceSettings>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    pub fn new(initial: VoiceSettings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx, path: None }
    }

    /// Open a store persisted at `path`, merging any saved values over
    /// `defaults`. A missing or corrupt file leaves the defaults.
    pub fn open(path: impl Into<PathBuf>, defaults: VoiceSettings) -> Self {
        let path = path.into();
        let settings = load_settings(&path, defaults);
        let (tx, _) = watch::channel(settings);
        Self {
            tx,
            path: Some(path),
        }
    }

    pub fn get(&self) -> VoiceSettings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceSettings> {
        self.tx.subscribe()
    }

    /// Apply a partial update and return the new settings.
    pub fn update(&self, update: &SettingsUpdate) -> VoiceSettings {
        self.tx.send_if_modified(|settings| {
            let before = settings.clone();
            settings.apply(update);
            *settings != before
        });
        let settings = self.get();
        debug!(?settings, "voice settings updated");
        self.persist(&settings);
        settings
    }

    pub fn set_voice(&self, voice: &str) -> VoiceSettings {
        self.update(&SettingsUpdate {
            voice: Some(voice.to_string()),
            ..SettingsUpdate::default()
        })
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.get())?;
        fs::write(path, json)?;
        Ok(())
    }

    fn persist(&self, settings: &VoiceSettings) {
        if let Err(e) = self.save() {
            warn!("Failed to save voice settings {settings:?}: {e}");
        }
    }
}

fn load_settings(path: &Path, defaults: VoiceSettings) -> VoiceSettings {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return defaults,
    };
    match serde_json::from_str::<SettingsUpdate>(&contents) {
        Ok(saved) => {
            let mut settings = defaults;
            settings.apply(&saved);
            info!("Loaded voice settings from {}", path.display());
            settings
        }
        Err(e) => {
            warn!("Ignoring corrupt voice settings {}: {e}", path.display());
            defaults
        }
    }
}
