//! Shared fixtures for the playback integration tests
//!
//! Every test runs against the headless backend on a paused tokio clock, so
//! track lengths, fades, and ticks advance in virtual time.

#![allow(dead_code)]

use cadence_ap::audio::{AudioSource, HeadlessBackend, HeadlessProbe, PcmBuffer, TrackResolver};
use cadence_ap::config::PlaybackTuning;
use cadence_ap::playback::SessionPersistence;
use cadence_ap::{Error, PlaybackEngine, PlayerHandle, PlayerSnapshot, Result, SavedSession};
use cadence_common::events::PlayerEvent;
use cadence_common::{Track, TrackId};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Sample rate of the silent buffers the resolver hands out
const RATE: u32 = 100;

/// Blocks a resolution until `open` is called
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (open, cvar) = &*self.0;
        *open.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (open, cvar) = &*self.0;
        let mut guard = open.lock().unwrap();
        while !*guard {
            guard = cvar.wait(guard).unwrap();
        }
    }
}

/// How the resolver answers for one path
#[derive(Clone)]
pub enum Script {
    /// Silent buffer of the given length
    Ready(f64),
    Fail,
    /// Silent buffer, released only once the gate opens
    Gated(f64, Gate),
}

/// Resolver that answers from a table of scripted paths
#[derive(Default)]
pub struct ScriptedResolver {
    scripts: Mutex<HashMap<PathBuf, Script>>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    pub fn set(&self, track: &Track, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(track.path.clone(), script);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrackResolver for ScriptedResolver {
    fn resolve(&self, track: &Track) -> Result<AudioSource> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().get(&track.path).cloned();
        let unavailable = || Error::SourceUnavailable {
            track: track.title.clone(),
            reason: "scripted failure".to_string(),
        };
        match script {
            Some(Script::Ready(secs)) => Ok(AudioSource::buffered(PcmBuffer::silence(secs, RATE))),
            Some(Script::Gated(secs, gate)) => {
                gate.wait();
                Ok(AudioSource::buffered(PcmBuffer::silence(secs, RATE)))
            }
            Some(Script::Fail) | None => Err(unavailable()),
        }
    }
}

/// Track under `/virtual/` with a matching duration hint
pub fn track(name: &str, secs: f64) -> Track {
    Track::from_path(format!("/virtual/{}.wav", name)).with_duration_hint(secs)
}

/// Everything persisted, in call order
#[derive(Default)]
pub struct RecordingPersistence {
    pub sessions: Mutex<Vec<SavedSession>>,
    pub favorites: Mutex<Vec<(TrackId, bool)>>,
}

impl RecordingPersistence {
    pub fn last_session(&self) -> Option<SavedSession> {
        self.sessions.lock().unwrap().last().cloned()
    }
}

impl SessionPersistence for RecordingPersistence {
    fn save_session(&self, saved: SavedSession) -> BoxFuture<'static, Result<()>> {
        self.sessions.lock().unwrap().push(saved);
        async { Ok(()) }.boxed()
    }

    fn set_favorite(&self, track_id: TrackId, favorite: bool) -> BoxFuture<'static, Result<()>> {
        self.favorites.lock().unwrap().push((track_id, favorite));
        async { Ok(()) }.boxed()
    }
}

/// A running session plus the probes tests assert against
pub struct Harness {
    pub player: PlayerHandle,
    pub probe: HeadlessProbe,
    pub resolver: Arc<ScriptedResolver>,
    pub events: broadcast::Receiver<PlayerEvent>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(PlaybackTuning::default(), None)
    }

    pub fn start_with(
        tuning: PlaybackTuning,
        persistence: Option<Arc<dyn SessionPersistence>>,
    ) -> Self {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let resolver = Arc::new(ScriptedResolver::default());

        let mut builder = PlaybackEngine::builder(Box::new(backend), resolver.clone())
            .tuning(tuning)
            .seed(7);
        if let Some(persistence) = persistence {
            builder = builder.persistence(persistence);
        }
        let (player, task) = builder.spawn().unwrap();
        let events = player.subscribe();

        Self {
            player,
            probe,
            resolver,
            events,
            task,
        }
    }

    /// Script `name` as a ready track of `secs` seconds
    pub fn ready(&self, name: &str, secs: f64) -> Track {
        let track = track(name, secs);
        self.resolver.set(&track, Script::Ready(secs));
        track
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.player.snapshot()
    }

    /// Every event received so far
    pub fn drain_events(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn wait_for(&self, what: &str, predicate: impl FnMut(&PlayerSnapshot) -> bool) {
        wait_for(&self.player, what, predicate).await;
    }
}

/// Wait (in virtual time) until a published snapshot satisfies `predicate`
pub async fn wait_for(
    player: &PlayerHandle,
    what: &str,
    predicate: impl FnMut(&PlayerSnapshot) -> bool,
) {
    let mut rx = player.watch();
    let waited = tokio::time::timeout(Duration::from_secs(600), rx.wait_for(predicate)).await;
    match waited {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => panic!("session closed while waiting for {}", what),
        Err(_) => panic!("timed out waiting for {}: {:?}", what, player.snapshot()),
    }
}

/// Advance virtual time
pub async fn advance(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}
