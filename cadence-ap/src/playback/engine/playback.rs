//! Playback control - play, pause, resume, stop, seek, and transitions
//!
//! **Transition protocol** (play, next with a queue, loop-all):
//! 1. Settle any crossfade still in flight
//! 2. Pick the target channel: the inactive one when crossfading, else the active one
//! 3. Record the outgoing track in history, enter Buffering, resolve off-task
//! 4. Apply the resolved source only if its token is still the pending one
//! 5. Schedule, start at gain 0, fade in (crossfade or short fade), enter Playing

use super::core::{Outgoing, PendingTransition, Session};
use super::{Internal, TransitionToken};
use crate::audio::{AudioSource, ChannelId};
use crate::error::{Error, Result};
use crate::playback::channel::AudioChannel;
use crate::playback::fader::FadeCompletion;
use crate::playback::state::SavedSession;
use cadence_common::events::{PlaybackState, PlayerEvent};
use cadence_common::Track;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn schedule_on(channel: &mut AudioChannel, source: AudioSource, offset: f64) -> Result<()> {
    channel.set_gain(0.0);
    channel.schedule_from_offset(source, offset)?;
    channel.start()
}

impl Session {
    pub(super) fn play(&mut self, track: Track) -> Result<()> {
        info!("Play '{}'", track.title);
        let crossfade = self.state == PlaybackState::Playing;
        self.begin_transition(track, 0.0, crossfade, true);
        Ok(())
    }

    pub(super) fn pause(&mut self) -> Result<()> {
        if self.state != PlaybackState::Playing {
            debug!("Pause ignored while {}", self.state);
            return Ok(());
        }

        self.settle_crossfade();
        self.current_time = self.live_position();
        self.ticker.stop();
        self.set_state(PlaybackState::Paused);

        let active = self.active;
        let from = self.channels[active.index()].gain();
        let fade = self.tuning.short_fade();
        self.start_fade(active, from, 0.0, fade, FadeCompletion::PauseSettled);

        info!("Paused at {:.2}s", self.current_time);
        self.persist_session();
        Ok(())
    }

    pub(super) fn resume(&mut self) -> Result<()> {
        if self.state != PlaybackState::Paused {
            debug!("Resume ignored while {}", self.state);
            return Ok(());
        }
        let Some(track) = self.current_track.clone() else {
            self.set_state(PlaybackState::Stopped);
            return Ok(());
        };

        let active = self.active;
        let at = self.current_time;
        let Some(source) = self.channels[active.index()].source().cloned() else {
            info!("Cold resume of '{}' at {:.2}s", track.title, at);
            self.begin_transition(track, at, false, false);
            return Ok(());
        };

        self.fades.cancel_all();
        for channel in &mut self.channels {
            channel.stop();
        }
        if let Err(e) = self.schedule_and_start(active, source, at) {
            self.fail_transition(&track, e);
            return Ok(());
        }

        let fade = self.tuning.short_fade();
        self.start_fade(active, 0.0, 1.0, fade, FadeCompletion::None);
        self.last_progress_second = None;
        self.set_state(PlaybackState::Playing);
        self.ticker.start();
        info!("Resumed '{}' at {:.2}s", track.title, at);
        Ok(())
    }

    pub(super) fn toggle_play_pause(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Buffering => Ok(()),
            PlaybackState::Stopped => match self.current_track.clone() {
                Some(track) => self.play(track),
                None if !self.queue.is_empty() => self.next(),
                None => Ok(()),
            },
        }
    }

    pub(super) fn stop(&mut self) -> Result<()> {
        self.pending = None;
        self.fades.cancel_all();
        self.cancel_seek();
        // Unconditional double stop; unbind stops again
        for channel in &mut self.channels {
            channel.stop();
        }
        for channel in &mut self.channels {
            channel.unbind();
            channel.set_gain(1.0);
        }
        self.outgoing = None;
        self.is_transitioning = false;
        self.ticker.stop();
        self.current_time = 0.0;
        self.duration = 0.0;
        self.last_progress_second = None;
        self.set_state(PlaybackState::Stopped);
        self.persist_session();
        Ok(())
    }

    pub(super) fn seek(&mut self, position: f64) -> Result<()> {
        let mut target = Self::require_finite(position, "Seek position")?.max(0.0);
        if self.duration > 0.0 {
            target = target.min(self.duration);
        }

        match self.state {
            PlaybackState::Stopped => return Ok(()),
            PlaybackState::Buffering => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.start_at = target;
                }
                self.current_time = target;
                return Ok(());
            }
            PlaybackState::Paused => {
                self.current_time = target;
                return Ok(());
            }
            PlaybackState::Playing => {}
        }

        let active = self.active;
        let Some(source) = self.channels[active.index()].source().cloned() else {
            return Ok(());
        };

        self.is_seeking = true;
        self.seek_serial += 1;
        self.suppressed_end = None;
        self.fades.cancel_all();
        self.settle_crossfade();
        for channel in &mut self.channels {
            channel.stop();
        }
        for channel in &mut self.channels {
            channel.stop();
            channel.set_gain(1.0);
        }

        if let Err(e) = self.schedule_and_start(active, source, target) {
            self.cancel_seek();
            if let Some(track) = self.current_track.clone() {
                self.fail_transition(&track, e);
            }
            return Ok(());
        }
        self.channels[active.index()].set_gain(1.0);
        self.current_time = target;
        self.last_progress_second = None;

        if let Some(task) = self.grace_task.take() {
            task.abort();
        }
        let serial = self.seek_serial;
        let grace = self.tuning.seek_grace();
        let tx = self.internal_tx.clone();
        self.grace_task = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(Internal::GraceElapsed {
                seek_serial: serial,
            });
        }));

        debug!("Seeked to {:.2}s", target);
        Ok(())
    }

    pub(super) fn on_grace_elapsed(&mut self, seek_serial: u64) {
        if seek_serial != self.seek_serial || !self.is_seeking {
            return;
        }
        self.is_seeking = false;
        self.grace_task = None;

        // An end that landed inside the window belongs to the new schedule
        // only if its generation is still current.
        if let Some(ended) = self.suppressed_end.take() {
            self.on_channel_ended(ended);
        }
    }

    pub(super) fn cancel_seek(&mut self) {
        if let Some(task) = self.grace_task.take() {
            task.abort();
        }
        self.is_seeking = false;
        self.suppressed_end = None;
    }

    /// Arm a cold resume from persisted state
    pub(super) fn restore(&mut self, saved: SavedSession) -> Result<()> {
        if self.state != PlaybackState::Stopped {
            return Err(Error::InvalidState(format!(
                "cannot restore a session while {}",
                self.state
            )));
        }

        self.volume = saved.volume.clamp(0.0, 1.0);
        self.apply_master_gain();

        if let Some(track) = saved.track {
            info!(
                "Restored '{}' at {:.2}s (volume {:.2})",
                track.title, saved.elapsed, self.volume
            );
            self.duration = track.duration_hint.unwrap_or(0.0);
            let mut elapsed = saved.elapsed.max(0.0);
            if self.duration > 0.0 {
                elapsed = elapsed.min(self.duration);
            }
            self.current_time = elapsed;
            self.current_track = Some(track);
            self.set_state(PlaybackState::Paused);
        }
        Ok(())
    }

    /// Start a transition to `track`, leaving the session Buffering
    pub(super) fn begin_transition(
        &mut self,
        track: Track,
        start_at: f64,
        crossfade: bool,
        record_history: bool,
    ) {
        self.settle_crossfade();
        self.cancel_seek();
        self.ticker.stop();

        self.transition_serial += 1;
        let token = TransitionToken {
            track_id: track.id,
            serial: self.transition_serial,
        };

        let outgoing_id = self.current_track.as_ref().map(|t| t.id);
        let crossfade = crossfade && outgoing_id.is_some();

        let target = match outgoing_id {
            Some(track_id) if crossfade => {
                let from = self.active;
                let target = from.other();
                self.fades.cancel(target);
                self.channels[target.index()].unbind();
                self.outgoing = Some(Outgoing {
                    channel: from,
                    track_id,
                });
                self.active = target;
                self.is_transitioning = true;
                target
            }
            _ => {
                self.fades.cancel_all();
                for channel in &mut self.channels {
                    channel.unbind();
                    channel.set_gain(1.0);
                }
                self.active
            }
        };

        if record_history {
            if let Some(current) = self.current_track.take() {
                if current.id != track.id {
                    self.queue.push_history(current);
                }
            }
        }

        debug!(
            "Transition {} to '{}' on channel {} (crossfade: {}, from {:.2}s)",
            token.serial, track.title, target, crossfade, start_at
        );

        self.current_track = Some(track.clone());
        self.duration = track.duration_hint.unwrap_or(0.0);
        self.current_time = start_at;
        self.last_progress_second = None;
        self.set_state(PlaybackState::Buffering);
        self.pending = Some(PendingTransition {
            token,
            track: track.clone(),
            target,
            crossfade,
            start_at,
        });

        let resolver = Arc::clone(&self.resolver);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let title = track.title.clone();
            let result = match tokio::task::spawn_blocking(move || resolver.resolve(&track)).await
            {
                Ok(result) => result,
                Err(e) => Err(Error::SourceUnavailable {
                    track: title,
                    reason: format!("resolver task failed: {}", e),
                }),
            };
            let _ = tx.send(Internal::Resolved { token, result });
        });
    }

    pub(super) fn on_resolved(&mut self, token: TransitionToken, result: Result<AudioSource>) {
        if self.pending.as_ref().map(|p| p.token) != Some(token) {
            debug!(
                "Discarding stale resolution for {} (transition {})",
                token.track_id, token.serial
            );
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        let source = match result {
            Ok(source) => source,
            Err(e) => {
                self.fail_transition(&pending.track, e);
                return;
            }
        };

        if let Err(e) = self.schedule_and_start(pending.target, source.clone(), pending.start_at) {
            self.fail_transition(&pending.track, e);
            return;
        }

        if source.duration() > 0.0 {
            self.duration = source.duration();
        }
        self.current_time = pending.start_at;

        let crossfading = pending.crossfade && self.outgoing.is_some();
        if let (true, Some(outgoing)) = (crossfading, self.outgoing) {
            let duration = self.tuning.crossfade();
            self.emit(PlayerEvent::CrossfadeStarted {
                outgoing: outgoing.track_id,
                incoming: pending.track.id,
                duration: duration.as_secs_f64(),
                timestamp: Utc::now(),
            });
            let from = self.channels[outgoing.channel.index()].gain();
            self.start_fade(pending.target, 0.0, 1.0, duration, FadeCompletion::None);
            self.start_fade(
                outgoing.channel,
                from,
                0.0,
                duration,
                FadeCompletion::CrossfadeSettled,
            );
        } else {
            let fade = self.tuning.short_fade();
            self.start_fade(pending.target, 0.0, 1.0, fade, FadeCompletion::None);
        }

        self.set_state(PlaybackState::Playing);
        self.emit(PlayerEvent::TrackStarted {
            track_id: pending.track.id,
            title: pending.track.title.clone(),
            duration: self.duration,
            start_time: pending.start_at,
            crossfade: crossfading,
            timestamp: Utc::now(),
        });
        self.ticker.start();
        info!(
            "Playing '{}' on channel {} ({} source, {:.2}s)",
            pending.track.title,
            pending.target,
            source.kind(),
            self.duration
        );
    }

    /// Schedule and start, rebuilding the output graph once on failure
    pub(super) fn schedule_and_start(
        &mut self,
        target: ChannelId,
        source: AudioSource,
        offset: f64,
    ) -> Result<()> {
        let first = schedule_on(&mut self.channels[target.index()], source.clone(), offset);
        let Err(e) = first else {
            return Ok(());
        };

        warn!(
            "Schedule on channel {} failed ({}); reinitializing {} output",
            target,
            e,
            self.backend.name()
        );
        self.backend.reinitialize()?;
        schedule_on(&mut self.channels[target.index()], source, offset)
    }

    /// Report a terminal failure and land in Stopped with the queue untouched
    pub(super) fn fail_transition(&mut self, track: &Track, error: Error) {
        warn!("Playback of '{}' failed: {}", track.title, error);
        self.emit(PlayerEvent::PlaybackFailed {
            track_id: track.id,
            reason: error.to_string(),
            timestamp: Utc::now(),
        });

        self.pending = None;
        self.fades.cancel_all();
        self.cancel_seek();
        for channel in &mut self.channels {
            channel.unbind();
            channel.set_gain(1.0);
        }
        self.outgoing = None;
        self.is_transitioning = false;
        self.ticker.stop();
        self.current_time = 0.0;
        self.duration = 0.0;
        self.last_progress_second = None;
        self.set_state(PlaybackState::Stopped);
    }
}
