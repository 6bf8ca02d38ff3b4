//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lektor::config::NarrationConfig;
use lektor::narration::{
    NarrationChannel, Sequencer, SettingsStore, SpeechEngine, SpeechErrorKind, Utterance, UtteranceEvents,
    VoiceSettings,
};
use lektor::reader::NarrationScript;
use tokio::sync::mpsc;

/// Speech engine driven by the test: every utterance is handed to the test,
/// which decides when it starts, ends or fails.
pub struct ScriptedEngine {
    spoken: mpsc::UnboundedSender<(Utterance, UtteranceEvents)>,
    active: Mutex<Vec<UtteranceEvents>>,
    cancels: AtomicUsize,
    available: bool,
}

impl ScriptedEngine {
    pub fn new(available: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<(Utterance, UtteranceEvents)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            spoken: tx,
            active: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            available,
        });
        (engine, rx)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Utterances handed over since the last `cancel_all`.
    pub fn active(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

impl SpeechEngine for ScriptedEngine {
    fn synthesize(&self, utterance: Utterance, events: UtteranceEvents) {
        self.active.lock().unwrap().push(events.clone());
        let _ = self.spoken.send((utterance, events));
    }

    fn cancel_all(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        for events in self.active.lock().unwrap().drain(..) {
            events.failed(SpeechErrorKind::Interrupted);
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

pub struct Harness {
    pub sequencer: Sequencer,
    pub sentences: mpsc::UnboundedReceiver<Option<usize>>,
    pub spoken: mpsc::UnboundedReceiver<(Utterance, UtteranceEvents)>,
    pub engine: Arc<ScriptedEngine>,
    pub channel: Arc<NarrationChannel>,
    pub settings: Arc<SettingsStore>,
}

impl Harness {
    /// A sequencer with `markdown` loaded and default voice settings.
    pub fn new(markdown: &str) -> Self {
        let (engine, spoken) = ScriptedEngine::new(true);
        let channel = Arc::new(NarrationChannel::new(engine.clone()));
        let settings = Arc::new(SettingsStore::new(VoiceSettings::default()));
        let (sequencer, sentences) =
            Sequencer::spawn(channel.clone(), settings.subscribe(), &NarrationConfig::default());
        sequencer
            .load(NarrationScript::from_markdown(markdown))
            .expect("sequencer running");

        Self {
            sequencer,
            sentences,
            spoken,
            engine,
            channel,
            settings,
        }
    }

    /// Another sequencer sharing this harness's channel and settings.
    pub fn rival(&self, markdown: &str) -> (Sequencer, mpsc::UnboundedReceiver<Option<usize>>) {
        let (sequencer, sentences) = Sequencer::spawn(
            self.channel.clone(),
            self.settings.subscribe(),
            &NarrationConfig::default(),
        );
        sequencer
            .load(NarrationScript::from_markdown(markdown))
            .expect("sequencer running");
        (sequencer, sentences)
    }

    pub async fn next_utterance(&mut self) -> (Utterance, UtteranceEvents) {
        self.spoken.recv().await.expect("engine alive")
    }

    pub async fn next_sentence(&mut self) -> Option<usize> {
        self.sentences.recv().await.expect("sequencer alive")
    }
}
