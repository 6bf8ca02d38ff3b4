//! The narration channel: one speech output shared by every sequencer.
//!
//! The last sequencer to `acquire` wins. Acquiring cancels whatever the engine
//! is saying and publishes the new holder; the previous holder sees the change
//! on its watch receiver and stops itself. Speaking goes through the channel
//! too, under the same lock as `acquire`, so a sequencer that has just lost
//! the channel can never start an utterance behind the new holder's back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::debug;

use super::engine::{SpeechEngine, Utterance, UtteranceEvents};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HolderId(u64);

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "narrator-{}", self.0)
    }
}

pub struct NarrationChannel {
    engine: Arc<dyn SpeechEngine>,
    holder: watch::Sender<Option<HolderId>>,
    next_holder: AtomicU64,
    /// Serializes `acquire` against `synthesize`.
    gate: Mutex<()>,
}

impl NarrationChannel {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        let (holder, _) = watch::channel(None);
        Self {
            engine,
            holder,
            next_holder: AtomicU64::new(1),
            gate: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn SpeechEngine> {
        &self.engine
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    /// Allocate an identity for a new sequencer.
    pub fn register(&self) -> HolderId {
        HolderId(self.next_holder.fetch_add(1, Ordering::Relaxed))
    }

    /// Take the speech output, silencing the engine first.
    pub fn acquire(&self, owner: HolderId) {
        let _gate = self.gate.lock().unwrap();
        self.engine.cancel_all();
        let previous = self.holder.send_replace(Some(owner));
        if let Some(previous) = previous.filter(|p| *p != owner) {
            debug!("{owner} preempts {previous}");
        }
    }

    /// Hand `utterance` to the engine if `owner` holds the channel.
    ///
    /// Returns false, without speaking, when someone else holds it.
    pub fn synthesize(&self, owner: HolderId, utterance: Utterance, events: UtteranceEvents) -> bool {
        let _gate = self.gate.lock().unwrap();
        if !self.is_held_by(owner) {
            debug!("{owner} lost the channel, not speaking {:?}", utterance.id);
            return false;
        }
        self.engine.synthesize(utterance, events);
        true
    }

    /// Silence the engine if `owner` holds the channel.
    pub fn cancel(&self, owner: HolderId) -> bool {
        let _gate = self.gate.lock().unwrap();
        if !self.is_held_by(owner) {
            return false;
        }
        self.engine.cancel_all();
        true
    }

    /// Give the output back if `owner` still holds it.
    pub fn release(&self, owner: HolderId) {
        self.holder.send_if_modified(|holder| {
            if *holder == Some(owner) {
                *holder = None;
                true
            } else {
                false
            }
        });
    }

    pub fn holder(&self) -> Option<HolderId> {
        *self.holder.borrow()
    }

    pub fn is_held_by(&self, owner: HolderId) -> bool {
        self.holder() == Some(owner)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<HolderId>> {
        self.holder.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::narration::engine::UtteranceId;

    #[derive(Default)]
    struct CountingEngine {
        cancels: AtomicUsize,
        spoken: AtomicUsize,
    }

    impl SpeechEngine for CountingEngine {
        fn synthesize(&self, _utterance: Utterance, _events: UtteranceEvents) {
            self.spoken.fetch_add(1, Ordering::Relaxed);
        }

        fn cancel_all(&self) {
            self.cancels.fetch_add(1, Ordering::Relaxed);
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn last_acquirer_wins() {
        let engine = Arc::new(CountingEngine::default());
        let channel = NarrationChannel::new(engine.clone());
        let (a, b) = (channel.register(), channel.register());
        assert_ne!(a, b);

        let mut watcher = channel.subscribe();
        channel.acquire(a);
        channel.acquire(b);
        assert!(channel.is_held_by(b));
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), Some(b));
        assert_eq!(engine.cancels.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn release_only_by_holder() {
        let channel = NarrationChannel::new(Arc::new(CountingEngine::default()));
        let (a, b) = (channel.register(), channel.register());
        channel.acquire(a);
        channel.release(b);
        assert_eq!(channel.holder(), Some(a));
        channel.release(a);
        assert_eq!(channel.holder(), None);
    }

    #[test]
    fn only_the_holder_can_speak() {
        let engine = Arc::new(CountingEngine::default());
        let channel = NarrationChannel::new(engine.clone());
        let (a, b) = (channel.register(), channel.register());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let utterance = Utterance {
            id: UtteranceId(1),
            text: "Zdanie.".into(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice: None,
        };

        channel.acquire(a);
        assert!(channel.synthesize(a, utterance.clone(), UtteranceEvents::new(UtteranceId(1), tx.clone())));
        channel.acquire(b);
        assert!(!channel.synthesize(a, utterance, UtteranceEvents::new(UtteranceId(1), tx)));
        assert_eq!(engine.spoken.load(Ordering::Relaxed), 1);

        let cancels = engine.cancels.load(Ordering::Relaxed);
        assert!(!channel.cancel(a));
        assert!(channel.cancel(b));
        assert_eq!(engine.cancels.load(Ordering::Relaxed), cancels + 1);
    }
}
