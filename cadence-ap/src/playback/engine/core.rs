//! Session actor - state, mailbox loop, and shared helpers
//!
//! **Responsibilities:**
//! - `Session` struct definition and construction
//! - The `run` loop that serializes every delivery onto one task
//! - Snapshot publication, events, fades, ticks, and end-of-source handling
//!
//! Playback operations live in `playback.rs`; queue, volume, and flag
//! operations in `queue.rs`.

use super::{Command, Internal, SessionPersistence, TransitionToken};
use crate::audio::{ChannelEnded, ChannelId, OutputBackend, TrackResolver};
use crate::config::PlaybackTuning;
use crate::error::{Error, Result};
use crate::playback::channel::AudioChannel;
use crate::playback::fader::{FadeCompletion, FadeController, FadeStart, FadeStep, FadeTick};
use crate::playback::queue::PlayQueue;
use crate::playback::state::{PlayerSnapshot, SavedSession};
use crate::playback::ticker::{evaluate, PositionTick, PositionTicker, TickInput};
use cadence_common::events::{EventBus, LoopMode, PlaybackState, PlayerEvent};
use cadence_common::{Track, TrackId};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Receivers drained by the run loop
pub(super) struct Mailbox {
    commands: mpsc::UnboundedReceiver<Command>,
    internal: mpsc::UnboundedReceiver<Internal>,
    fades: mpsc::UnboundedReceiver<FadeTick>,
    ends: mpsc::UnboundedReceiver<ChannelEnded>,
    ticks: mpsc::UnboundedReceiver<PositionTick>,
}

/// A transition waiting for its source to resolve
pub(super) struct PendingTransition {
    pub(super) token: TransitionToken,
    pub(super) track: Track,
    pub(super) target: ChannelId,
    pub(super) crossfade: bool,
    /// Offset to schedule from once resolved
    pub(super) start_at: f64,
}

/// The channel being faded out by a crossfade
#[derive(Debug, Clone, Copy)]
pub(super) struct Outgoing {
    pub(super) channel: ChannelId,
    pub(super) track_id: TrackId,
}

/// The playback session. Owned by its task; never shared.
pub(super) struct Session {
    pub(super) state: PlaybackState,
    pub(super) current_track: Option<Track>,
    pub(super) active: ChannelId,
    pub(super) current_time: f64,
    pub(super) duration: f64,
    pub(super) volume: f32,
    pub(super) is_muted: bool,
    pub(super) loop_mode: LoopMode,
    pub(super) shuffle: bool,
    pub(super) is_transitioning: bool,
    pub(super) is_seeking: bool,

    pub(super) queue: PlayQueue,
    pub(super) channels: [AudioChannel; 2],
    pub(super) backend: Box<dyn OutputBackend>,
    pub(super) fades: FadeController,
    pub(super) ticker: PositionTicker,
    pub(super) resolver: Arc<dyn TrackResolver>,
    pub(super) tuning: PlaybackTuning,
    pub(super) events: EventBus,
    pub(super) snapshot_tx: watch::Sender<PlayerSnapshot>,
    pub(super) persistence: Option<Arc<dyn SessionPersistence>>,
    pub(super) internal_tx: mpsc::UnboundedSender<Internal>,

    pub(super) pending: Option<PendingTransition>,
    pub(super) outgoing: Option<Outgoing>,
    pub(super) transition_serial: u64,
    pub(super) seek_serial: u64,
    pub(super) grace_task: Option<JoinHandle<()>>,
    /// End-of-source signal that arrived inside the seek grace window
    pub(super) suppressed_end: Option<ChannelEnded>,
    pub(super) last_progress_second: Option<u64>,
    pub(super) rng: StdRng,
}

impl Session {
    pub(super) fn new(
        mut backend: Box<dyn OutputBackend>,
        resolver: Arc<dyn TrackResolver>,
        tuning: PlaybackTuning,
        persistence: Option<Arc<dyn SessionPersistence>>,
        events: EventBus,
        seed: Option<u64>,
    ) -> (
        Self,
        Mailbox,
        watch::Receiver<PlayerSnapshot>,
        mpsc::UnboundedSender<Command>,
    ) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let (fade_tx, fades) = mpsc::unbounded_channel();
        let (end_tx, ends) = mpsc::unbounded_channel();
        let (tick_tx, ticks) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(PlayerSnapshot::default());

        backend.set_master_gain(1.0);
        let channels = [
            AudioChannel::new(ChannelId::A, backend.path(ChannelId::A), end_tx.clone()),
            AudioChannel::new(ChannelId::B, backend.path(ChannelId::B), end_tx),
        ];
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "Playback session created (output: {}, crossfade {:.1}s)",
            backend.name(),
            tuning.crossfade_secs
        );

        let session = Self {
            state: PlaybackState::Stopped,
            current_track: None,
            active: ChannelId::A,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            is_muted: false,
            loop_mode: LoopMode::Off,
            shuffle: false,
            is_transitioning: false,
            is_seeking: false,
            queue: PlayQueue::new(),
            channels,
            backend,
            fades: FadeController::new(tuning.fade_steps, fade_tx),
            ticker: PositionTicker::new(tuning.tick_interval(), tick_tx),
            resolver,
            tuning,
            events,
            snapshot_tx,
            persistence,
            internal_tx,
            pending: None,
            outgoing: None,
            transition_serial: 0,
            seek_serial: 0,
            grace_task: None,
            suppressed_end: None,
            last_progress_second: None,
            rng,
        };

        let mailbox = Mailbox {
            commands,
            internal,
            fades,
            ends,
            ticks,
        };

        (session, mailbox, snapshot_rx, command_tx)
    }

    /// Serve the mailbox until shutdown or until every handle is dropped
    pub(super) async fn run(mut self, mut mailbox: Mailbox) {
        info!("Playback session started");

        loop {
            // Audio-side deliveries first so gains and ends are applied before
            // the next command observes the session.
            tokio::select! {
                biased;

                Some(tick) = mailbox.fades.recv() => self.on_fade_tick(tick),
                Some(ended) = mailbox.ends.recv() => self.on_channel_ended(ended),
                Some(message) = mailbox.internal.recv() => self.on_internal(message),
                Some(tick) = mailbox.ticks.recv() => self.on_position_tick(tick),
                command = mailbox.commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.shutdown();
                        self.publish();
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("All player handles dropped");
                        self.shutdown();
                        break;
                    }
                },
            }
            self.publish();
        }

        info!("Playback session stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Play(track, reply) => {
                let result = self.play(track);
                self.answer(reply, result);
            }
            Command::Pause(reply) => {
                let result = self.pause();
                self.answer(reply, result);
            }
            Command::Resume(reply) => {
                let result = self.resume();
                self.answer(reply, result);
            }
            Command::TogglePlayPause(reply) => {
                let result = self.toggle_play_pause();
                self.answer(reply, result);
            }
            Command::Stop(reply) => {
                let result = self.stop();
                self.answer(reply, result);
            }
            Command::Seek(position, reply) => {
                let result = self.seek(position);
                self.answer(reply, result);
            }
            Command::Next(reply) => {
                let result = self.next();
                self.answer(reply, result);
            }
            Command::Previous(reply) => {
                let result = self.previous();
                self.answer(reply, result);
            }
            Command::AddToQueue(track, reply) => {
                let result = self.add_to_queue(track);
                self.answer(reply, result);
            }
            Command::RemoveFromQueue(index, reply) => {
                let result = self.remove_from_queue(index);
                self.answer(reply, result);
            }
            Command::ClearQueue(reply) => {
                let result = self.clear_queue();
                self.answer(reply, result);
            }
            Command::StartPlaylist(tracks, reply) => {
                let result = self.start_playlist(tracks);
                self.answer(reply, result);
            }
            Command::SetVolume(volume, reply) => {
                let result = self.set_volume(volume);
                self.answer(reply, result);
            }
            Command::ToggleMute(reply) => {
                let result = self.toggle_mute();
                self.answer(reply, result);
            }
            Command::CycleLoopMode(reply) => {
                let result = self.cycle_loop_mode();
                self.answer(reply, result);
            }
            Command::ToggleShuffle(reply) => {
                let result = self.toggle_shuffle();
                self.answer(reply, result);
            }
            Command::ToggleFavorite(reply) => {
                let result = self.toggle_favorite();
                self.answer(reply, result);
            }
            Command::Restore(saved, reply) => {
                let result = self.restore(saved);
                self.answer(reply, result);
            }
            // Handled by the run loop
            Command::Shutdown(reply) => {
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Publish first so a caller awaiting the reply sees the new snapshot
    fn answer<T>(&mut self, reply: oneshot::Sender<Result<T>>, result: Result<T>) {
        if let Err(e) = &result {
            debug!("Command rejected: {}", e);
        }
        self.publish();
        let _ = reply.send(result);
    }

    fn on_internal(&mut self, message: Internal) {
        match message {
            Internal::Resolved { token, result } => self.on_resolved(token, result),
            Internal::GraceElapsed { seek_serial } => self.on_grace_elapsed(seek_serial),
            Internal::Persisted { what, result } => match result {
                Ok(()) => trace!("Persisted {}", what),
                Err(e) => warn!("Failed to persist {}: {}", what, e),
            },
        }
    }

    // ----- Observation -----

    pub(super) fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            state: self.state,
            current_track: self.current_track.clone(),
            current_time: self.current_time,
            duration: self.duration,
            volume: self.volume,
            is_muted: self.is_muted,
            loop_mode: self.loop_mode,
            is_shuffle_enabled: self.shuffle,
            is_transitioning: self.is_transitioning,
            is_seeking: self.is_seeking,
            active_channel: self.active,
            upcoming: self.queue.upcoming().iter().cloned().collect(),
            history_len: self.queue.history().len(),
        }
    }

    pub(super) fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    pub(super) fn emit(&self, event: PlayerEvent) {
        self.events.emit_lossy(event);
    }

    pub(super) fn set_state(&mut self, new_state: PlaybackState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        info!("Playback state changed: {} -> {}", old_state, new_state);
        self.emit(PlayerEvent::StateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    pub(super) fn emit_queue_changed(&self) {
        self.emit(PlayerEvent::QueueChanged {
            upcoming: self.queue.upcoming_ids(),
            timestamp: Utc::now(),
        });
    }

    /// Position in the current track, read live from the active channel
    /// while audible
    pub(super) fn live_position(&self) -> f64 {
        let channel = &self.channels[self.active.index()];
        if self.state != PlaybackState::Playing || self.is_seeking || !channel.has_source() {
            return self.current_time;
        }
        let position = channel.current_position_seconds();
        if self.duration > 0.0 {
            position.min(self.duration)
        } else {
            position
        }
    }

    // ----- Persistence -----

    /// Save track, elapsed time, and volume without waiting on I/O
    pub(super) fn persist_session(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let saved = SavedSession {
            track: self.current_track.clone(),
            elapsed: self.current_time,
            volume: self.volume,
        };
        self.spawn_persist("session", persistence.save_session(saved));
    }

    pub(super) fn persist_favorite(&self, track_id: TrackId, favorite: bool) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        self.spawn_persist("favorite", persistence.set_favorite(track_id, favorite));
    }

    fn spawn_persist(
        &self,
        what: &'static str,
        future: futures::future::BoxFuture<'static, Result<()>>,
    ) {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = future.await.map_err(|e| e.to_string());
            let _ = tx.send(Internal::Persisted { what, result });
        });
    }

    // ----- Fades -----

    /// Start a fade, applying degenerate fades at once
    pub(super) fn start_fade(
        &mut self,
        channel: ChannelId,
        from: f32,
        to: f32,
        duration: Duration,
        completion: FadeCompletion,
    ) {
        self.channels[channel.index()].set_gain(from);
        match self.fades.fade(channel, from, to, duration, completion) {
            FadeStart::Running => {}
            FadeStart::Immediate(completion) => {
                self.channels[channel.index()].set_gain(to);
                self.on_fade_completed(channel, completion);
            }
        }
    }

    fn on_fade_tick(&mut self, tick: FadeTick) {
        match self.fades.on_tick(tick) {
            FadeStep::Ignored => {}
            FadeStep::Gain(gain) => self.channels[tick.channel.index()].set_gain(gain),
            FadeStep::Completed { gain, completion } => {
                self.channels[tick.channel.index()].set_gain(gain);
                self.on_fade_completed(tick.channel, completion);
            }
        }
    }

    fn on_fade_completed(&mut self, channel: ChannelId, completion: FadeCompletion) {
        match completion {
            FadeCompletion::None => {}
            FadeCompletion::PauseSettled => {
                if self.state == PlaybackState::Paused {
                    // Sources stay bound for a warm resume
                    for channel in &mut self.channels {
                        channel.stop();
                    }
                    debug!("Pause fade settled; channels stopped");
                }
            }
            FadeCompletion::CrossfadeSettled => {
                if self.outgoing.map(|o| o.channel) == Some(channel) {
                    self.finish_crossfade();
                }
            }
        }
    }

    /// Stop the outgoing channel and close the transition window
    pub(super) fn finish_crossfade(&mut self) {
        let Some(outgoing) = self.outgoing.take() else {
            return;
        };
        let channel = &mut self.channels[outgoing.channel.index()];
        channel.unbind();
        channel.set_gain(1.0);
        self.is_transitioning = false;
        debug!("Crossfade settled; channel {} released", outgoing.channel);
        self.emit(PlayerEvent::CrossfadeCompleted {
            outgoing: outgoing.track_id,
            timestamp: Utc::now(),
        });
    }

    /// Cut an in-flight crossfade short: the incoming side snaps to full gain
    pub(super) fn settle_crossfade(&mut self) {
        if self.outgoing.is_none() {
            return;
        }
        self.fades.cancel_all();
        self.channels[self.active.index()].set_gain(1.0);
        self.finish_crossfade();
    }

    // ----- Ticks and end-of-source -----

    fn on_position_tick(&mut self, tick: PositionTick) {
        if !self.ticker.is_current(tick) {
            return;
        }
        let channel = &self.channels[self.active.index()];
        let outcome = evaluate(TickInput {
            state: self.state,
            is_seeking: self.is_seeking,
            is_transitioning: self.is_transitioning,
            schedule_offset: channel.schedule_offset(),
            rendered: channel.rendered_seconds(),
            duration: self.duration,
            crossfade: self.tuning.crossfade_secs,
            queue_len: self.queue.len(),
        });

        if let Some(position) = outcome.position {
            self.current_time = position;
            let second = position.floor() as u64;
            if self.last_progress_second != Some(second) {
                self.last_progress_second = Some(second);
                self.emit(PlayerEvent::Progress {
                    track_id: self.current_track.as_ref().map(|t| t.id),
                    position,
                    duration: self.duration,
                    timestamp: Utc::now(),
                });
            }
        }

        if outcome.auto_advance {
            info!(
                "Auto-advancing at {:.2}s of {:.2}s",
                self.current_time, self.duration
            );
            self.advance();
        }
    }

    pub(super) fn on_channel_ended(&mut self, ended: ChannelEnded) {
        let channel = &self.channels[ended.channel.index()];
        if ended.channel != self.active || ended.generation != channel.generation() {
            trace!(
                "Discarding stale end signal (channel {}, generation {})",
                ended.channel,
                ended.generation
            );
            return;
        }
        if self.is_seeking {
            self.suppressed_end = Some(ended);
            return;
        }
        if self.is_transitioning || self.state != PlaybackState::Playing {
            return;
        }

        info!("Track reached its end on channel {}", ended.channel);
        self.advance();
    }

    /// `next()` on behalf of the session itself
    pub(super) fn advance(&mut self) {
        if let Err(e) = self.next() {
            warn!("Advance failed: {}", e);
        }
    }

    /// Reject values that cannot be positions or levels
    pub(super) fn require_finite(value: f64, what: &str) -> Result<f64> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Error::InvalidState(format!("{} must be a finite number", what)))
        }
    }

    fn shutdown(&mut self) {
        self.pending = None;
        self.fades.cancel_all();
        self.ticker.stop();
        if let Some(task) = self.grace_task.take() {
            task.abort();
        }
        for channel in &mut self.channels {
            channel.unbind();
        }
        self.outgoing = None;
        self.is_transitioning = false;
        self.is_seeking = false;
        self.set_state(PlaybackState::Stopped);
    }
}
