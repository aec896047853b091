//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: the `Session` actor, its mailbox loop, snapshots and events
//! - `playback.rs`: play/pause/resume/stop/seek and the transition protocol
//! - `queue.rs`: next/previous, queue edits, volume, loop, shuffle, favorites
//! - `handle.rs`: `PlayerHandle`, the cloneable public API
//!
//! Every mutation of session state happens on the actor task. Commands,
//! resolution results, fade ticks, position ticks, end-of-source signals and
//! persistence acknowledgements all arrive as messages.

mod core;
mod handle;
mod playback;
mod queue;

pub use handle::PlayerHandle;

use crate::audio::{AudioSource, EffectChain, OutputBackend, TrackResolver};
use crate::config::PlaybackTuning;
use crate::error::Result;
use crate::playback::state::SavedSession;
use cadence_common::events::{EventBus, LoopMode};
use cadence_common::{Track, TrackId};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Persistence collaborator: last session and favorite flags.
///
/// Calls return futures the engine spawns and never awaits inline.
pub trait SessionPersistence: Send + Sync + 'static {
    fn save_session(&self, saved: SavedSession) -> BoxFuture<'static, Result<()>>;

    fn set_favorite(&self, track_id: TrackId, favorite: bool) -> BoxFuture<'static, Result<()>>;
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// Public operations, sent from `PlayerHandle` to the session
pub(crate) enum Command {
    Play(Track, Reply<()>),
    Pause(Reply<()>),
    Resume(Reply<()>),
    TogglePlayPause(Reply<()>),
    Stop(Reply<()>),
    Seek(f64, Reply<()>),
    Next(Reply<()>),
    Previous(Reply<()>),
    AddToQueue(Track, Reply<()>),
    RemoveFromQueue(usize, Reply<Track>),
    ClearQueue(Reply<()>),
    StartPlaylist(Vec<Track>, Reply<()>),
    SetVolume(f32, Reply<()>),
    ToggleMute(Reply<bool>),
    CycleLoopMode(Reply<LoopMode>),
    ToggleShuffle(Reply<bool>),
    ToggleFavorite(Reply<bool>),
    Restore(SavedSession, Reply<()>),
    Shutdown(Reply<()>),
}

/// Identity a resolution result must match to be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransitionToken {
    pub track_id: TrackId,
    pub serial: u64,
}

/// Deliveries from work the session spawned
pub(crate) enum Internal {
    Resolved {
        token: TransitionToken,
        result: Result<AudioSource>,
    },
    GraceElapsed {
        seek_serial: u64,
    },
    Persisted {
        what: &'static str,
        result: std::result::Result<(), String>,
    },
}

/// Builds and spawns the session actor
pub struct PlaybackEngine {
    backend: Box<dyn OutputBackend>,
    resolver: Arc<dyn TrackResolver>,
    tuning: PlaybackTuning,
    persistence: Option<Arc<dyn SessionPersistence>>,
    events: Option<EventBus>,
    effects: Option<Box<dyn EffectChain>>,
    seed: Option<u64>,
}

impl PlaybackEngine {
    pub fn builder(backend: Box<dyn OutputBackend>, resolver: Arc<dyn TrackResolver>) -> Self {
        Self {
            backend,
            resolver,
            tuning: PlaybackTuning::default(),
            persistence: None,
            events: None,
            effects: None,
            seed: None,
        }
    }

    pub fn tuning(mut self, tuning: PlaybackTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn SessionPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Share an existing event bus instead of creating one
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Effect insert installed on the output before the session starts
    pub fn effects(mut self, effects: Box<dyn EffectChain>) -> Self {
        self.effects = Some(effects);
        self
    }

    /// Seed the shuffle RNG for reproducible runs
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Start the session task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> Result<(PlayerHandle, JoinHandle<()>)> {
        self.tuning.validate()?;
        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(self.tuning.event_capacity));

        let mut backend = self.backend;
        if let Some(effects) = self.effects {
            backend.set_effects(Some(effects));
        }

        let (session, mailbox, snapshot_rx, command_tx) = self::core::Session::new(
            backend,
            self.resolver,
            self.tuning,
            self.persistence,
            events.clone(),
            self.seed,
        );

        let task = tokio::spawn(session.run(mailbox));
        Ok((PlayerHandle::new(command_tx, snapshot_rx, events), task))
    }
}
