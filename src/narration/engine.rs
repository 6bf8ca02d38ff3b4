//! Speech engine seam.
//!
//! The sequencer hands one `Utterance` at a time to a `SpeechEngine` and
//! learns about its progress through `UtteranceEvents`. Engines report back on
//! an mpsc channel so the sequencer can process callbacks on its own task.

use tokio::sync::mpsc;

/// Generation id of one utterance; callbacks for any other id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(pub u64);

/// One sentence with the voice settings captured when it was issued.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechErrorKind {
    /// Cut off by `cancel_all` or another utterance.
    Interrupted,
    /// Dropped from the queue before it started.
    Canceled,
    AudioBusy,
    VoiceUnavailable,
    SynthesisFailed,
    InvalidArgument,
}

impl SpeechErrorKind {
    /// Errors caused by our own cancellation; narration ignores these.
    pub fn is_benign(self) -> bool {
        matches!(self, Self::Interrupted | Self::Canceled)
    }
}

impl std::fmt::Display for SpeechErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Interrupted => "interrupted",
            Self::Canceled => "canceled",
            Self::AudioBusy => "audio-busy",
            Self::VoiceUnavailable => "voice-unavailable",
            Self::SynthesisFailed => "synthesis-failed",
            Self::InvalidArgument => "invalid-argument",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceEventKind {
    Started,
    Ended,
    Failed(SpeechErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtteranceEvent {
    pub id: UtteranceId,
    pub kind: UtteranceEventKind,
}

/// Callback handle given to the engine together with an utterance.
#[derive(Debug, Clone)]
pub struct UtteranceEvents {
    id: UtteranceId,
    tx: mpsc::UnboundedSender<UtteranceEvent>,
}

impl UtteranceEvents {
    pub fn new(id: UtteranceId, tx: mpsc::UnboundedSender<UtteranceEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> UtteranceId {
        self.id
    }

    pub fn started(&self) {
        self.emit(UtteranceEventKind::Started);
    }

    pub fn ended(&self) {
        self.emit(UtteranceEventKind::Ended);
    }

    pub fn failed(&self, kind: SpeechErrorKind) {
        self.emit(UtteranceEventKind::Failed(kind));
    }

    fn emit(&self, kind: UtteranceEventKind) {
        // The sequencer may already be gone.
        let _ = self.tx.send(UtteranceEvent { id: self.id, kind });
    }
}

/// A text-to-speech backend.
///
/// `synthesize` must not block: it queues the utterance and reports through
/// `events`. `cancel_all` stops everything the engine is doing, for every
/// caller.
pub trait SpeechEngine: Send + Sync {
    fn synthesize(&self, utterance: Utterance, events: UtteranceEvents);

    fn cancel_all(&self);

    fn is_available(&self) -> bool;
}
