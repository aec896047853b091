//! Event types for the Cadence event system
//!
//! Provides the shared `PlayerEvent` definitions and the `EventBus` every
//! observer (SSE clients, now-playing bridges, loggers) subscribes to.

mod playback_types;

pub use playback_types::{LoopMode, PlaybackState};

use crate::track::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Player event types
///
/// Events are broadcast via `EventBus` and serialize with a `type` tag so they
/// can be forwarded verbatim over SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Session state changed
    StateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },

    /// A track became audible on the active channel
    TrackStarted {
        track_id: TrackId,
        title: String,
        /// Source duration in seconds
        duration: f64,
        /// Offset the track started from (seconds)
        start_time: f64,
        /// True when the track entered through a crossfade
        crossfade: bool,
        timestamp: DateTime<Utc>,
    },

    /// Elapsed-time publication from the position ticker
    Progress {
        track_id: Option<TrackId>,
        position: f64,
        duration: f64,
        timestamp: DateTime<Utc>,
    },

    /// Overlapping fade between two tracks began
    CrossfadeStarted {
        outgoing: TrackId,
        incoming: TrackId,
        /// Crossfade length in seconds
        duration: f64,
        timestamp: DateTime<Utc>,
    },

    /// Outgoing channel finished fading and was stopped
    CrossfadeCompleted {
        outgoing: TrackId,
        timestamp: DateTime<Utc>,
    },

    /// Upcoming queue contents changed
    QueueChanged {
        upcoming: Vec<TrackId>,
        timestamp: DateTime<Utc>,
    },

    VolumeChanged {
        volume: f32,
        muted: bool,
        timestamp: DateTime<Utc>,
    },

    LoopModeChanged {
        mode: LoopMode,
        timestamp: DateTime<Utc>,
    },

    ShuffleChanged {
        enabled: bool,
        timestamp: DateTime<Utc>,
    },

    FavoriteChanged {
        track_id: TrackId,
        favorite: bool,
        timestamp: DateTime<Utc>,
    },

    /// Terminal failure for a play/next attempt
    PlaybackFailed {
        track_id: TrackId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::TrackStarted { .. } => "TrackStarted",
            PlayerEvent::Progress { .. } => "Progress",
            PlayerEvent::CrossfadeStarted { .. } => "CrossfadeStarted",
            PlayerEvent::CrossfadeCompleted { .. } => "CrossfadeCompleted",
            PlayerEvent::QueueChanged { .. } => "QueueChanged",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::LoopModeChanged { .. } => "LoopModeChanged",
            PlayerEvent::ShuffleChanged { .. } => "ShuffleChanged",
            PlayerEvent::FavoriteChanged { .. } => "FavoriteChanged",
            PlayerEvent::PlaybackFailed { .. } => "PlaybackFailed",
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::sync::broadcast` internally:
/// - Non-blocking publish (slow subscribers never block the engine)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose the oldest events instead of stalling producers
///
/// # Examples
///
/// ```
/// use cadence_common::events::{EventBus, PlayerEvent, PlaybackState};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(PlayerEvent::StateChanged {
///     old_state: PlaybackState::Stopped,
///     new_state: PlaybackState::Playing,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
