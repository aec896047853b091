//! OS media-remote bridge
//!
//! Maps remote-control buttons onto session operations and republishes
//! now-playing metadata whenever the session snapshot changes. The player
//! never fetches artwork; it forwards whatever reference the track carries.

use crate::error::Result;
use crate::playback::{PlayerHandle, PlayerSnapshot};
use cadence_common::events::PlaybackState;
use cadence_common::human_time::format_progress;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commands a media remote can issue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "position", rename_all = "snake_case")]
pub enum RemoteCommand {
    Play,
    Pause,
    Toggle,
    Next,
    Previous,
    SeekTo(f64),
}

/// Route a remote command to the session
pub async fn dispatch_remote(player: &PlayerHandle, command: RemoteCommand) -> Result<()> {
    debug!("Remote command: {:?}", command);
    match command {
        RemoteCommand::Play => {
            if player.snapshot().state == PlaybackState::Paused {
                player.resume().await
            } else {
                player.toggle_play_pause().await
            }
        }
        RemoteCommand::Pause => player.pause().await,
        RemoteCommand::Toggle => player.toggle_play_pause().await,
        RemoteCommand::Next => player.next().await,
        RemoteCommand::Previous => player.previous().await,
        RemoteCommand::SeekTo(position) => player.seek(position).await,
    }
}

/// Metadata handed to the OS now-playing surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: Option<String>,
    pub duration: f64,
    pub elapsed: f64,
    pub is_playing: bool,
    pub artwork: Option<String>,
}

impl NowPlaying {
    /// `None` when nothing is loaded
    pub fn from_snapshot(snapshot: &PlayerSnapshot) -> Option<Self> {
        let track = snapshot.current_track.as_ref()?;
        Some(Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            duration: snapshot.duration,
            elapsed: snapshot.current_time,
            is_playing: snapshot.is_playing(),
            artwork: track.artwork.clone(),
        })
    }

    /// Whether `self` is worth republishing after `previous`. Forward
    /// progress alone is not: OS surfaces extrapolate elapsed time.
    pub fn supersedes(&self, previous: &NowPlaying) -> bool {
        self.title != previous.title
            || self.artist != previous.artist
            || self.duration != previous.duration
            || self.is_playing != previous.is_playing
            || self.artwork != previous.artwork
            || self.elapsed < previous.elapsed
    }
}

/// Receiver of now-playing updates (an OS integration, a test recorder)
pub trait NowPlayingPublisher: Send + 'static {
    fn publish(&mut self, now_playing: &NowPlaying);

    fn clear(&mut self);
}

/// Publisher that writes now-playing changes to the log
#[derive(Debug, Default)]
pub struct LogPublisher;

impl NowPlayingPublisher for LogPublisher {
    fn publish(&mut self, now_playing: &NowPlaying) {
        info!(
            "Now playing: {}{} [{}] ({})",
            now_playing.title,
            now_playing
                .artist
                .as_deref()
                .map(|a| format!(" - {}", a))
                .unwrap_or_default(),
            if now_playing.is_playing { "playing" } else { "paused" },
            format_progress(now_playing.elapsed, Some(now_playing.duration))
        );
    }

    fn clear(&mut self) {
        info!("Now playing: nothing");
    }
}

/// Drives a publisher from the snapshot watch channel
pub struct NowPlayingBridge {
    task: JoinHandle<()>,
}

impl NowPlayingBridge {
    pub fn spawn(player: &PlayerHandle, publisher: impl NowPlayingPublisher) -> Self {
        let snapshots = player.watch();
        let task = tokio::spawn(run_bridge(snapshots, publisher));
        info!("Now-playing bridge started");
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

async fn run_bridge(
    mut snapshots: watch::Receiver<PlayerSnapshot>,
    mut publisher: impl NowPlayingPublisher,
) {
    let mut last: Option<NowPlaying> = None;
    loop {
        let current = NowPlaying::from_snapshot(&snapshots.borrow_and_update());
        let changed = match (&current, &last) {
            (Some(now), Some(prev)) => now.supersedes(prev),
            (None, None) => false,
            _ => true,
        };
        if changed {
            match &current {
                Some(now) => publisher.publish(now),
                None => publisher.clear(),
            }
            last = current;
        }

        if snapshots.changed().await.is_err() {
            warn!("Session closed; now-playing bridge exiting");
            break;
        }
    }
}
