//! Persistence tests: what the session saves, when, and the SQLite store
//! behind it

mod helpers;

use cadence_ap::config::PlaybackTuning;
use cadence_ap::db::{self, Store};
use cadence_ap::playback::SessionPersistence;
use cadence_common::events::PlaybackState;
use helpers::{advance, Harness, RecordingPersistence};
use std::sync::Arc;
use std::time::Duration;

fn recorded() -> (Arc<RecordingPersistence>, Harness) {
    let recorder = Arc::new(RecordingPersistence::default());
    let persistence: Arc<dyn SessionPersistence> = recorder.clone();
    let harness = Harness::start_with(PlaybackTuning::default(), Some(persistence));
    (recorder, harness)
}

#[tokio::test(start_paused = true)]
async fn test_pause_saves_track_and_position() {
    let (recorder, h) = recorded();
    let a = h.ready("a", 30.0);

    h.player.play(a.clone()).await.unwrap();
    h.wait_for("playing", |s| s.state == PlaybackState::Playing).await;
    advance(7.0).await;
    assert!(recorder.sessions.lock().unwrap().is_empty());

    h.player.pause().await.unwrap();
    advance(0.01).await;

    let saved = recorder.last_session().unwrap();
    assert_eq!(saved.track.map(|t| t.id), Some(a.id));
    assert_eq!(saved.elapsed, 7.0);
    assert_eq!(saved.volume, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_volume_and_stop_are_saved_but_mute_is_not() {
    let (recorder, h) = recorded();

    h.player.set_volume(0.3).await.unwrap();
    advance(0.01).await;
    assert_eq!(recorder.last_session().unwrap().volume, 0.3);
    let saves = recorder.sessions.lock().unwrap().len();

    h.player.toggle_mute().await.unwrap();
    advance(0.01).await;
    assert_eq!(recorder.sessions.lock().unwrap().len(), saves);

    h.player.stop().await.unwrap();
    advance(0.01).await;
    let saved = recorder.last_session().unwrap();
    assert_eq!(saved.elapsed, 0.0);
    assert_eq!(saved.volume, 0.3);
}

#[tokio::test(start_paused = true)]
async fn test_favorite_toggles_are_forwarded() {
    let (recorder, h) = recorded();
    let a = h.ready("a", 30.0);

    h.player.play(a.clone()).await.unwrap();
    h.player.toggle_favorite().await.unwrap();
    h.player.toggle_favorite().await.unwrap();
    advance(0.01).await;

    let favorites = recorder.favorites.lock().unwrap().clone();
    assert_eq!(favorites, vec![(a.id, true), (a.id, false)]);
}

/// Real clock: the SQLite driver runs on its own thread
#[tokio::test]
async fn test_sqlite_store_round_trip_through_session() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::connect(&dir.path().join("state").join("cadence.db"))
        .await
        .unwrap();
    let store = Store::new(pool);

    let persistence: Arc<dyn SessionPersistence> = Arc::new(store.clone());
    let h = Harness::start_with(PlaybackTuning::default(), Some(persistence));
    let a = h.ready("a", 30.0);

    h.player.play(a.clone()).await.unwrap();
    h.wait_for("playing", |s| s.state == PlaybackState::Playing).await;
    h.player.set_volume(0.6).await.unwrap();
    assert!(h.player.toggle_favorite().await.unwrap());
    h.player.pause().await.unwrap();

    let mut saved = store.sessions().load().await.unwrap();
    for _ in 0..100 {
        if saved.track.is_some() && store.favorites().is_favorite(a.id).await.unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        saved = store.sessions().load().await.unwrap();
    }

    assert_eq!(saved.track.as_ref().map(|t| t.id), Some(a.id));
    assert!((saved.volume - 0.6).abs() < 1e-6);
    assert!(saved.elapsed >= 0.0 && saved.elapsed < 30.0);
    assert!(store.favorites().is_favorite(a.id).await.unwrap());

    // A fresh session resumes from what was stored
    h.player.shutdown().await.unwrap();
    let restored = Harness::start();
    restored.ready("a", 30.0);
    restored.player.restore(saved.clone()).await.unwrap();
    let snapshot = restored.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Paused);
    assert_eq!(snapshot.current_track_id(), Some(a.id));
    assert_eq!(snapshot.current_time, saved.elapsed);
}
