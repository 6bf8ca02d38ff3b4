//! Narration: speak a sentence list aloud, one utterance at a time.
//!
//! Components:
//! - `engine`: the `SpeechEngine` seam and utterance callbacks
//! - `espeak`: espeak-ng backend driven through `tokio::process`
//! - `channel`: the shared speech output, last starter wins
//! - `settings`: voice settings, voice choice and the settings store
//! - `sequencer`: per-document state machine task

pub mod channel;
pub mod engine;
pub mod espeak;
pub mod sequencer;
pub mod settings;

pub use channel::{HolderId, NarrationChannel};
pub use engine::{
    SpeechEngine, SpeechErrorKind, Utterance, UtteranceEvent, UtteranceEventKind, UtteranceEvents, UtteranceId,
};
pub use espeak::CommandSpeechEngine;
pub use sequencer::{NarrationStatus, Sequencer, SequencerState};
pub use settings::{choose_default_voice, filter_voices, SettingsStore, SettingsUpdate, Voice, VoiceSettings};
