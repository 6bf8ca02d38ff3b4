//! Configuration management for lektor.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so a partial (or missing) file is fine.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Initial voice settings, used until the user changes them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub pause_duration_ms: u64,
    pub voice: Option<String>,
    /// JSON file the settings are persisted to. Empty means ~/.cache/lektor/voice.json.
    pub settings_file: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            pause_duration_ms: 300,
            voice: None,
            settings_file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Delay before re-speaking the current sentence after a live settings change.
    pub settings_guard_ms: u64,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            settings_guard_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// espeak-ng compatible program.
    pub program: String,
    /// Words per minute at rate 1.0.
    pub base_wpm: u32,
    pub extra_args: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "espeak-ng".into(),
            base_wpm: 175,
            extra_args: vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8768,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub data_dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub voice: VoiceConfig,
    pub narration: NarrationConfig,
    pub speech: SpeechConfig,
    pub api: ApiConfig,
    pub library: LibraryConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/lektor/config.yaml
    /// 3. /etc/lektor/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/lektor/config.yaml")),
                Some(PathBuf::from("/etc/lektor/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        let config = serde_yml::from_str(contents)?;
        info!("Config parsed");
        Ok(config)
    }

    pub fn settings_path(&self) -> PathBuf {
        if self.voice.settings_file.is_empty() {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lektor/voice.json")
        } else {
            PathBuf::from(&self.voice.settings_file)
        }
    }
}
