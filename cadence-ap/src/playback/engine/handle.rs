//! Cloneable front door to the playback session

use super::{Command, Reply};
use crate::error::{Error, Result};
use crate::playback::state::{PlayerSnapshot, SavedSession};
use cadence_common::events::{EventBus, LoopMode, PlayerEvent};
use cadence_common::Track;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Handle to a running playback session
///
/// Every method is a message to the session task; replies arrive once the
/// session has applied the operation and published its snapshot. Once the
/// session has exited every call returns `Error::EngineClosed`.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<PlayerSnapshot>,
    events: EventBus,
}

impl PlayerHandle {
    pub(super) fn new(
        tx: mpsc::UnboundedSender<Command>,
        snapshots: watch::Receiver<PlayerSnapshot>,
        events: EventBus,
    ) -> Self {
        Self {
            tx,
            snapshots,
            events,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| Error::EngineClosed)?;
        reply_rx.await.map_err(|_| Error::EngineClosed)?
    }

    pub async fn play(&self, track: Track) -> Result<()> {
        self.request(|reply| Command::Play(track, reply)).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(Command::Resume).await
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.request(Command::TogglePlayPause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    /// Jump to `seconds` in the current track (clamped to its duration)
    pub async fn seek(&self, seconds: f64) -> Result<()> {
        self.request(|reply| Command::Seek(seconds, reply)).await
    }

    pub async fn next(&self) -> Result<()> {
        self.request(Command::Next).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.request(Command::Previous).await
    }

    pub async fn add_to_queue(&self, track: Track) -> Result<()> {
        self.request(|reply| Command::AddToQueue(track, reply)).await
    }

    /// Remove and return the upcoming track at `index`
    pub async fn remove_from_queue(&self, index: usize) -> Result<Track> {
        self.request(|reply| Command::RemoveFromQueue(index, reply)).await
    }

    pub async fn clear_queue(&self) -> Result<()> {
        self.request(Command::ClearQueue).await
    }

    /// Replace the queue with `tracks` and play the first one
    pub async fn start_playlist(&self, tracks: Vec<Track>) -> Result<()> {
        self.request(|reply| Command::StartPlaylist(tracks, reply)).await
    }

    /// Set the master volume (0.0..=1.0)
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.request(|reply| Command::SetVolume(volume, reply)).await
    }

    /// Returns the new mute state
    pub async fn toggle_mute(&self) -> Result<bool> {
        self.request(Command::ToggleMute).await
    }

    /// Off → All → One → Off; returns the new mode
    pub async fn cycle_loop_mode(&self) -> Result<LoopMode> {
        self.request(Command::CycleLoopMode).await
    }

    pub async fn toggle_shuffle(&self) -> Result<bool> {
        self.request(Command::ToggleShuffle).await
    }

    /// Flip the current track's favorite flag; returns the new flag
    pub async fn toggle_favorite(&self) -> Result<bool> {
        self.request(Command::ToggleFavorite).await
    }

    /// Arm a cold resume from a persisted session
    pub async fn restore(&self, saved: SavedSession) -> Result<()> {
        self.request(|reply| Command::Restore(saved, reply)).await
    }

    /// Stop the session task. Later calls return `Error::EngineClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every published change
    pub fn watch(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
