//! Queue navigation and session settings
//!
//! next/previous, queue edits, volume and mute, loop mode, shuffle, and the
//! favorite flag of the current track.

use super::core::Session;
use crate::error::{Error, Result};
use cadence_common::events::{LoopMode, PlaybackState, PlayerEvent};
use cadence_common::Track;
use chrono::Utc;
use tracing::{debug, info};

impl Session {
    pub(super) fn next(&mut self) -> Result<()> {
        let crossfade = self.state == PlaybackState::Playing;

        if let Some(track) = self.queue.pop_next(self.shuffle, &mut self.rng) {
            info!("Next: '{}' ({} left in queue)", track.title, self.queue.len());
            self.begin_transition(track, 0.0, crossfade, true);
            self.emit_queue_changed();
            return Ok(());
        }

        match (self.loop_mode, self.current_track.clone()) {
            (LoopMode::One, Some(_)) => {
                debug!("Queue empty; repeating current track");
                self.seek(0.0)
            }
            (LoopMode::All, Some(track)) => {
                debug!("Queue empty; looping '{}'", track.title);
                self.begin_transition(track, 0.0, crossfade, false);
                Ok(())
            }
            _ => {
                debug!("Queue empty; stopping");
                self.stop()
            }
        }
    }

    pub(super) fn previous(&mut self) -> Result<()> {
        let position = self.live_position();
        if position > self.tuning.restart_threshold_secs {
            debug!("Previous at {:.2}s restarts the current track", position);
            return self.seek(0.0);
        }

        let Some(track) = self.queue.pop_history() else {
            return self.seek(0.0);
        };

        if let Some(current) = self.current_track.clone() {
            self.queue.push_front(current);
        }
        info!("Previous: back to '{}'", track.title);
        self.begin_transition(track, 0.0, false, false);
        self.emit_queue_changed();
        Ok(())
    }

    pub(super) fn add_to_queue(&mut self, track: Track) -> Result<()> {
        debug!("Queued '{}'", track.title);
        self.queue.push(track);
        self.emit_queue_changed();
        Ok(())
    }

    pub(super) fn remove_from_queue(&mut self, index: usize) -> Result<Track> {
        let removed = self.queue.remove(index)?;
        self.emit_queue_changed();
        Ok(removed)
    }

    pub(super) fn clear_queue(&mut self) -> Result<()> {
        self.queue.clear();
        self.emit_queue_changed();
        Ok(())
    }

    /// Replace the queue and play its first entry
    pub(super) fn start_playlist(&mut self, tracks: Vec<Track>) -> Result<()> {
        if tracks.is_empty() {
            return Err(Error::Queue("playlist is empty".to_string()));
        }
        info!("Starting playlist of {} tracks", tracks.len());
        self.queue.replace(tracks);
        let Some(first) = self.queue.pop_next(self.shuffle, &mut self.rng) else {
            return Err(Error::Queue("playlist is empty".to_string()));
        };
        self.emit_queue_changed();
        self.play(first)
    }

    pub(super) fn set_volume(&mut self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(Error::InvalidState(
                "volume must be a finite number".to_string(),
            ));
        }
        self.volume = volume.clamp(0.0, 1.0);
        self.apply_master_gain();
        self.emit_volume_changed();
        self.persist_session();
        Ok(())
    }

    pub(super) fn toggle_mute(&mut self) -> Result<bool> {
        self.is_muted = !self.is_muted;
        self.apply_master_gain();
        self.emit_volume_changed();
        Ok(self.is_muted)
    }

    pub(super) fn cycle_loop_mode(&mut self) -> Result<LoopMode> {
        self.loop_mode = self.loop_mode.cycle();
        debug!("Loop mode: {}", self.loop_mode);
        self.emit(PlayerEvent::LoopModeChanged {
            mode: self.loop_mode,
            timestamp: Utc::now(),
        });
        Ok(self.loop_mode)
    }

    pub(super) fn toggle_shuffle(&mut self) -> Result<bool> {
        self.shuffle = !self.shuffle;
        self.emit(PlayerEvent::ShuffleChanged {
            enabled: self.shuffle,
            timestamp: Utc::now(),
        });
        Ok(self.shuffle)
    }

    /// Flip the current track's favorite flag; persistence is fire-and-forget
    pub(super) fn toggle_favorite(&mut self) -> Result<bool> {
        let Some(track) = self.current_track.as_mut() else {
            return Err(Error::InvalidState("no current track".to_string()));
        };
        track.favorite = !track.favorite;
        let (track_id, favorite) = (track.id, track.favorite);

        self.queue.set_favorite(track_id, favorite);
        self.emit(PlayerEvent::FavoriteChanged {
            track_id,
            favorite,
            timestamp: Utc::now(),
        });
        self.persist_favorite(track_id, favorite);
        Ok(favorite)
    }

    pub(super) fn apply_master_gain(&mut self) {
        let gain = if self.is_muted { 0.0 } else { self.volume };
        self.backend.set_master_gain(gain);
    }

    fn emit_volume_changed(&self) {
        self.emit(PlayerEvent::VolumeChanged {
            volume: self.volume,
            muted: self.is_muted,
            timestamp: Utc::now(),
        });
    }
}
