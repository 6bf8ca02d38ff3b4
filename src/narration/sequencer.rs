//! Sentence-by-sentence narration with state machine.
//!
//! IDLE → PLAYING(i) → PAUSED(i) / STOPPED / IDLE
//!
//! Each sequencer is one tokio task. Commands, engine callbacks, the
//! inter-sentence timer, settings changes and channel preemption all arrive in
//! a single `select!` loop, so the state is never shared.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::channel::{HolderId, NarrationChannel};
use super::engine::{Utterance, UtteranceEvent, UtteranceEventKind, UtteranceEvents, UtteranceId};
use super::settings::VoiceSettings;
use crate::config::NarrationConfig;
use crate::error::{Error, Result};
use crate::reader::NarrationScript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    /// Global sentence index being spoken (or waited on).
    Playing(usize),
    Paused(usize),
    Stopped,
}

impl std::fmt::Display for SequencerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Playing(i) => write!(f, "PLAYING({i})"),
            Self::Paused(i) => write!(f, "PAUSED({i})"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Snapshot published after every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationStatus {
    pub is_playing: bool,
    pub is_paused: bool,
    /// Sentence last announced through the sentence-change channel.
    pub current_index: Option<usize>,
    pub stopped: bool,
}

#[derive(Debug)]
enum Command {
    Load(NarrationScript),
    PlayFrom(usize),
    Play,
    Pause,
    Stop,
    /// Answered once every earlier command has been handled.
    Sync(oneshot::Sender<NarrationStatus>),
}

/// Handle to a running sequencer task.
///
/// Cloning shares the task. When the last handle is dropped the task
/// silences the engine (if it holds the channel) and exits.
#[derive(Clone)]
pub struct Sequencer {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<NarrationStatus>,
    id: HolderId,
}

impl Sequencer {
    /// Spawn a sequencer task.
    ///
    /// Returns the handle and the sentence-change receiver, which yields
    /// `Some(index)` when a sentence starts and `None` when narration ends or
    /// stops.
    pub fn spawn(
        channel: Arc<NarrationChannel>,
        settings: watch::Receiver<VoiceSettings>,
        config: &NarrationConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Option<usize>>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (sentence_tx, sentence_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(NarrationStatus::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = channel.register();
        let last_settings = settings.borrow().clone();

        let task = SequencerTask {
            id,
            last_settings,
            settings,
            channel,
            guard: Duration::from_millis(config.settings_guard_ms),
            script: NarrationScript::default(),
            phase: Phase::Idle,
            in_flight: None,
            next_utterance: 0,
            timer: None,
            current_index: None,
            events_tx,
            sentence_tx,
            status_tx,
        };
        tokio::spawn(task.run(command_rx, events_rx));
        info!("Sequencer {id} started");

        (
            Self {
                commands: command_tx,
                status: status_rx,
                id,
            },
            sentence_rx,
        )
    }

    pub fn id(&self) -> HolderId {
        self.id
    }

    /// Replace the narrated sentences. Any narration in progress is stopped.
    pub fn load(&self, script: NarrationScript) -> Result<()> {
        self.send(Command::Load(script))
    }

    /// Start at global sentence `index`, or the next speakable one after it.
    pub fn play_from_sentence(&self, index: usize) -> Result<()> {
        self.send(Command::PlayFrom(index))
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Status after every command sent so far has taken effect.
    pub async fn sync(&self) -> Result<NarrationStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Sync(tx))?;
        rx.await.map_err(|_| Error::NarrationClosed)
    }

    pub fn status(&self) -> NarrationStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NarrationStatus> {
        self.status.clone()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::NarrationClosed)
    }
}

/// State keyed by position in the script, not by global index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Playing(usize),
    Paused(usize),
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// Inter-sentence pause is over; speak this position.
    Advance(usize),
    /// Settings changed mid-sentence; speak this position again.
    Restart(usize),
}

struct SequencerTask {
    id: HolderId,
    channel: Arc<NarrationChannel>,
    settings: watch::Receiver<VoiceSettings>,
    last_settings: VoiceSettings,
    guard: Duration,
    script: NarrationScript,
    phase: Phase,
    in_flight: Option<UtteranceId>,
    next_utterance: u64,
    timer: Option<(Instant, Pending)>,
    current_index: Option<usize>,
    events_tx: mpsc::UnboundedSender<UtteranceEvent>,
    sentence_tx: mpsc::UnboundedSender<Option<usize>>,
    status_tx: watch::Sender<NarrationStatus>,
}

impl SequencerTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<UtteranceEvent>,
    ) {
        let mut settings_rx = self.settings.clone();
        let mut settings_open = true;
        let mut holder_rx = self.channel.subscribe();

        loop {
            let deadline = self.timer.map(|(at, _)| at);

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.on_command(command),
                        None => break,
                    }
                }
                Some(event) = events.recv() => self.on_event(event),
                _ = sleep_until(deadline) => self.on_timer(),
                changed = settings_rx.changed(), if settings_open => {
                    if changed.is_ok() {
                        let settings = settings_rx.borrow_and_update().clone();
                        self.on_settings_changed(settings);
                    } else {
                        settings_open = false;
                    }
                }
                Ok(()) = holder_rx.changed() => {
                    let holder = *holder_rx.borrow_and_update();
                    self.on_holder_changed(holder);
                }
            }

            self.publish_status();
        }

        self.teardown();
    }

    fn on_command(&mut self, command: Command) {
        debug!("{}: {command:?} in {}", self.id, self.state());
        match command {
            Command::Load(script) => {
                self.halt();
                self.channel.release(self.id);
                if self.current_index.is_some() {
                    self.notify(None);
                }
                self.phase = Phase::Idle;
                info!("{}: loaded {} sentences", self.id, script.len());
                self.script = script;
            }
            Command::PlayFrom(index) => self.play_from(index),
            Command::Play => match self.phase {
                Phase::Paused(position) => {
                    self.channel.acquire(self.id);
                    self.phase = Phase::Playing(position);
                    self.speak(position);
                }
                Phase::Playing(_) => {}
                Phase::Idle | Phase::Stopped => self.play_from(0),
            },
            Command::Pause => {
                if let Phase::Playing(position) = self.phase {
                    self.halt();
                    self.phase = Phase::Paused(position);
                    info!("{}: PLAYING → PAUSED", self.id);
                }
            }
            Command::Stop => {
                self.halt();
                self.channel.release(self.id);
                self.phase = Phase::Stopped;
                self.notify(None);
                info!("{}: → STOPPED", self.id);
            }
            Command::Sync(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn play_from(&mut self, index: usize) {
        self.timer = None;
        self.in_flight = None;
        self.channel.acquire(self.id);

        match self.script.position_of(index) {
            Some(position) => {
                self.phase = Phase::Playing(position);
                self.speak(position);
            }
            None => self.finish(),
        }
    }

    /// Issue the utterance for `position`, or finish past the end.
    fn speak(&mut self, position: usize) {
        let Some(entry) = self.script.entries.get(position) else {
            self.finish();
            return;
        };

        self.next_utterance += 1;
        let id = UtteranceId(self.next_utterance);

        // Settings are read fresh for every utterance.
        let settings = self.settings.borrow().clone();
        let utterance = Utterance {
            id,
            text: entry.text.clone(),
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
            voice: settings.voice,
        };
        let index = entry.index;
        let events = UtteranceEvents::new(id, self.events_tx.clone());
        if !self.channel.synthesize(self.id, utterance, events) {
            // Another sequencer took the channel before its change reached us.
            self.preempted();
            return;
        }
        debug!("{}: speaking sentence {index} as {id:?}", self.id);
        self.in_flight = Some(id);
        self.phase = Phase::Playing(position);
    }

    fn on_event(&mut self, event: UtteranceEvent) {
        if self.in_flight != Some(event.id) {
            debug!("{}: dropping stale {:?} for {:?}", self.id, event.kind, event.id);
            return;
        }
        let Phase::Playing(position) = self.phase else {
            return;
        };

        match event.kind {
            UtteranceEventKind::Started => {
                let index = self.script.entries.get(position).map(|e| e.index);
                self.notify(index);
            }
            UtteranceEventKind::Ended => {
                self.in_flight = None;
                let pause = Duration::from_millis(self.settings.borrow().pause_duration_ms);
                self.timer = Some((Instant::now() + pause, Pending::Advance(position + 1)));
            }
            UtteranceEventKind::Failed(kind) if kind.is_benign() => {}
            UtteranceEventKind::Failed(kind) => {
                warn!("{}: speech error on sentence {position}: {kind}", self.id);
                self.in_flight = None;
                self.speak(position + 1);
            }
        }
    }

    fn on_timer(&mut self) {
        let Some((_, pending)) = self.timer.take() else {
            return;
        };
        if !matches!(self.phase, Phase::Playing(_)) {
            return;
        }
        match pending {
            Pending::Advance(position) | Pending::Restart(position) => self.speak(position),
        }
    }

    fn on_settings_changed(&mut self, settings: VoiceSettings) {
        let affects = settings.affects_speech(&self.last_settings);
        self.last_settings = settings;
        if !affects {
            return;
        }

        let Phase::Playing(position) = self.phase else {
            return;
        };
        let restarting = matches!(self.timer, Some((_, Pending::Restart(_))));
        if self.in_flight.is_none() && !restarting {
            // Between sentences: the next utterance picks the change up.
            return;
        }

        if !self.channel.cancel(self.id) {
            self.preempted();
            return;
        }

        info!("{}: settings changed, restarting sentence {position}", self.id);
        self.in_flight = None;
        self.timer = Some((Instant::now() + self.guard, Pending::Restart(position)));
    }

    fn on_holder_changed(&mut self, holder: Option<HolderId>) {
        if holder == Some(self.id) {
            return;
        }
        if matches!(self.phase, Phase::Playing(_) | Phase::Paused(_)) {
            debug!("{}: holder is now {:?}", self.id, holder);
            self.preempted();
        }
    }

    /// Another sequencer owns the channel: stop without touching the engine.
    fn preempted(&mut self) {
        info!("{}: preempted", self.id);
        self.timer = None;
        self.in_flight = None;
        self.phase = Phase::Stopped;
        self.notify(None);
    }

    /// End of script: back to idle and give up the channel.
    fn finish(&mut self) {
        self.timer = None;
        self.in_flight = None;
        self.phase = Phase::Idle;
        self.channel.release(self.id);
        self.notify(None);
        info!("{}: narration finished", self.id);
    }

    /// Cancel the in-flight utterance and any timer.
    fn halt(&mut self) {
        self.timer = None;
        if self.in_flight.take().is_some() {
            self.channel.cancel(self.id);
        }
    }

    fn teardown(&mut self) {
        self.timer = None;
        self.in_flight = None;
        if self.channel.cancel(self.id) {
            self.channel.release(self.id);
        }
        info!("Sequencer {} stopped", self.id);
    }

    fn notify(&mut self, index: Option<usize>) {
        self.current_index = index;
        let _ = self.sentence_tx.send(index);
    }

    fn state(&self) -> SequencerState {
        let index = |position: usize| {
            self.script
                .entries
                .get(position)
                .map_or(self.script.slots, |e| e.index)
        };
        match self.phase {
            Phase::Idle => SequencerState::Idle,
            Phase::Playing(p) => SequencerState::Playing(index(p)),
            Phase::Paused(p) => SequencerState::Paused(index(p)),
            Phase::Stopped => SequencerState::Stopped,
        }
    }

    fn snapshot(&self) -> NarrationStatus {
        NarrationStatus {
            is_playing: matches!(self.phase, Phase::Playing(_)),
            is_paused: matches!(self.phase, Phase::Paused(_)),
            current_index: self.current_index,
            stopped: self.phase == Phase::Stopped,
        }
    }

    fn publish_status(&self) {
        let status = self.snapshot();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
