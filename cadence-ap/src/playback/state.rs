//! Observable player state

use crate::audio::ChannelId;
use cadence_common::events::{LoopMode, PlaybackState};
use cadence_common::Track;
use serde::{Deserialize, Serialize};

/// Read-only view of the session, published after every engine step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub current_track: Option<Track>,
    /// Elapsed seconds in the current track
    pub current_time: f64,
    /// Length of the current track in seconds (0 when unknown)
    pub duration: f64,
    pub volume: f32,
    pub is_muted: bool,
    pub loop_mode: LoopMode,
    pub is_shuffle_enabled: bool,
    pub is_transitioning: bool,
    pub is_seeking: bool,
    pub active_channel: ChannelId,
    pub upcoming: Vec<Track>,
    pub history_len: usize,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Stopped,
            current_track: None,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            is_muted: false,
            loop_mode: LoopMode::Off,
            is_shuffle_enabled: false,
            is_transitioning: false,
            is_seeking: false,
            active_channel: ChannelId::A,
            upcoming: Vec::new(),
            history_len: 0,
        }
    }
}

impl PlayerSnapshot {
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn current_track_id(&self) -> Option<cadence_common::TrackId> {
        self.current_track.as_ref().map(|t| t.id)
    }
}

/// What the persistence collaborator stores for cold resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub track: Option<Track>,
    pub elapsed: f64,
    pub volume: f32,
}

impl Default for SavedSession {
    fn default() -> Self {
        Self {
            track: None,
            elapsed: 0.0,
            volume: 1.0,
        }
    }
}
