//! Transition tests: auto-advance, crossfades, stale resolutions, seeks,
//! and previous()
//!
//! All timing runs on a paused tokio clock against the headless backend.

mod helpers;

use cadence_ap::audio::ChannelId;
use cadence_common::events::{PlaybackState, PlayerEvent};
use helpers::{advance, track, Gate, Harness, Script};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_auto_advance_fires_once_at_crossfade_threshold() {
    let mut h = Harness::start();
    let a = h.ready("a", 10.0);
    let b = h.ready("b", 10.0);

    let started = Instant::now();
    h.player.play(a.clone()).await.unwrap();
    h.player.add_to_queue(b.clone()).await.unwrap();

    h.wait_for("auto-advance", |s| s.history_len == 1).await;
    let at = started.elapsed().as_secs_f64();
    assert!(
        (6.0..6.5).contains(&at),
        "advance should start once 4s remain, started at {:.2}s",
        at
    );

    h.wait_for("crossfade to settle", |s| {
        s.state == PlaybackState::Playing && !s.is_transitioning
    })
    .await;
    advance(1.0).await;

    let snapshot = h.snapshot();
    assert_eq!(snapshot.current_track_id(), Some(b.id));
    assert_eq!(snapshot.history_len, 1);

    let events = h.drain_events();
    let crossfades = events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::CrossfadeStarted { .. }))
        .count();
    assert_eq!(crossfades, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::TrackStarted { track_id, crossfade: true, .. } if *track_id == b.id
    )));
}

#[tokio::test(start_paused = true)]
async fn test_thirty_second_track_hands_over_at_26s() {
    let mut h = Harness::start();
    let a = h.ready("a", 30.0);
    let b = h.ready("b", 30.0);

    h.player.play(a.clone()).await.unwrap();
    h.player.add_to_queue(b.clone()).await.unwrap();
    h.wait_for("playing a", |s| s.state == PlaybackState::Playing).await;

    advance(25.9).await;
    assert_eq!(h.snapshot().current_track_id(), Some(a.id));
    assert!(!h.snapshot().is_transitioning);

    advance(0.2).await;
    let snapshot = h.snapshot();
    assert_eq!(snapshot.current_track_id(), Some(b.id));
    assert_eq!(snapshot.history_len, 1);
    assert!(snapshot.upcoming.is_empty());
    assert!(snapshot.is_transitioning);
    assert_eq!(snapshot.active_channel, ChannelId::B);

    advance(4.0).await;
    let snapshot = h.snapshot();
    assert!(!snapshot.is_transitioning);
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert!(!h.probe.is_running(ChannelId::A));

    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::CrossfadeStarted { outgoing, incoming, .. }
            if *outgoing == a.id && *incoming == b.id
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::CrossfadeCompleted { outgoing, .. } if *outgoing == a.id
    )));
}

#[tokio::test(start_paused = true)]
async fn test_crossfade_gains_sum_to_one() {
    let h = Harness::start();
    let a = h.ready("a", 30.0);
    let b = h.ready("b", 30.0);

    h.player.play(a).await.unwrap();
    h.wait_for("playing a", |s| s.state == PlaybackState::Playing).await;
    advance(5.0).await;

    h.player.add_to_queue(b).await.unwrap();
    h.player.next().await.unwrap();
    h.wait_for("crossfade", |s| {
        s.state == PlaybackState::Playing && s.is_transitioning
    })
    .await;

    // Sample between fade steps (steps land every 200ms)
    advance(0.1).await;
    for _ in 0..19 {
        let outgoing = h.probe.gain(ChannelId::A);
        let incoming = h.probe.gain(ChannelId::B);
        assert!((0.0..=1.0).contains(&outgoing));
        assert!((0.0..=1.0).contains(&incoming));
        assert!(
            (outgoing + incoming - 1.0).abs() < 1e-3,
            "gains {} + {} drifted from unity",
            outgoing,
            incoming
        );
        advance(0.2).await;
    }

    h.wait_for("crossfade to settle", |s| !s.is_transitioning).await;
    assert_eq!(h.probe.gain(ChannelId::B), 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_skip_mid_crossfade_records_history() {
    let mut h = Harness::start();
    let a = h.ready("a", 30.0);
    let b = h.ready("b", 30.0);
    let c = h.ready("c", 30.0);

    h.player.play(a.clone()).await.unwrap();
    h.player.add_to_queue(b.clone()).await.unwrap();
    h.player.add_to_queue(c.clone()).await.unwrap();
    h.wait_for("playing a", |s| s.state == PlaybackState::Playing).await;
    advance(2.0).await;

    h.player.next().await.unwrap();
    h.wait_for("crossfade into b", |s| {
        s.state == PlaybackState::Playing && s.is_transitioning
    })
    .await;
    advance(1.0).await;
    assert_eq!(h.snapshot().active_channel, ChannelId::B);

    // Skipping again settles the first crossfade and starts a new one
    h.player.next().await.unwrap();
    let snapshot = h.snapshot();
    assert_eq!(snapshot.current_track_id(), Some(c.id));
    assert_eq!(snapshot.history_len, 2);
    assert!(snapshot.upcoming.is_empty());
    assert_eq!(snapshot.active_channel, ChannelId::A);

    h.wait_for("crossfade into c to settle", |s| {
        s.state == PlaybackState::Playing && !s.is_transitioning
    })
    .await;
    let snapshot = h.snapshot();
    assert_eq!(snapshot.current_track_id(), Some(c.id));
    assert_eq!(snapshot.history_len, 2);
    assert!(!h.probe.is_running(ChannelId::B));
    assert!(h.probe.is_running(ChannelId::A));
    assert_eq!(h.probe.gain(ChannelId::A), 1.0);
    assert_eq!(h.probe.loaded_offset(ChannelId::B), None);

    let events = h.drain_events();
    let settled_a = events.iter().position(|e| {
        matches!(e, PlayerEvent::CrossfadeCompleted { outgoing, .. } if *outgoing == a.id)
    });
    let started_c = events.iter().position(|e| {
        matches!(
            e,
            PlayerEvent::CrossfadeStarted { outgoing, incoming, .. }
                if *outgoing == b.id && *incoming == c.id
        )
    });
    match (settled_a, started_c) {
        (Some(settled), Some(started)) => assert!(settled < started),
        other => panic!("missing crossfade events: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_seek_mid_crossfade_abandons_transition() {
    let mut h = Harness::start();
    let a = h.ready("a", 30.0);
    let b = h.ready("b", 30.0);

    h.player.play(a.clone()).await.unwrap();
    h.player.add_to_queue(b.clone()).await.unwrap();
    h.wait_for("playing a", |s| s.state == PlaybackState::Playing).await;
    advance(2.0).await;

    h.player.next().await.unwrap();
    h.wait_for("crossfade into b", |s| {
        s.state == PlaybackState::Playing && s.is_transitioning
    })
    .await;
    advance(1.0).await;

    h.player.seek(10.0).await.unwrap();
    let snapshot = h.snapshot();
    assert!(!snapshot.is_transitioning);
    assert!(snapshot.is_seeking);
    assert_eq!(snapshot.current_track_id(), Some(b.id));
    assert_eq!(snapshot.active_channel, ChannelId::B);
    assert_eq!(snapshot.current_time, 10.0);
    assert_eq!(snapshot.history_len, 1);

    // The outgoing channel is stopped and unbound; the incoming one restarts
    // at full gain from the seek target
    assert!(!h.probe.is_running(ChannelId::A));
    assert_eq!(h.probe.loaded_offset(ChannelId::A), None);
    assert_eq!(h.probe.loaded_offset(ChannelId::B), Some(10.0));
    assert!(h.probe.is_running(ChannelId::B));
    assert_eq!(h.probe.gain(ChannelId::B), 1.0);

    advance(5.0).await;
    let snapshot = h.snapshot();
    assert!(!snapshot.is_seeking);
    assert!(!snapshot.is_transitioning);
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert!(snapshot.current_time >= 14.5);
    assert!(!h.probe.is_running(ChannelId::A));
    assert_eq!(h.probe.gain(ChannelId::B), 1.0);

    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        PlayerEvent::CrossfadeCompleted { outgoing, .. } if *outgoing == a.id
    )));
}

#[tokio::test(start_paused = true)]
async fn test_stale_resolution_is_discarded() {
    let mut h = Harness::start();
    let slow = track("slow", 10.0);
    let gate = Gate::default();
    h.resolver.set(&slow, Script::Gated(10.0, gate.clone()));
    let fast = h.ready("fast", 10.0);

    h.player.play(slow.clone()).await.unwrap();
    assert_eq!(h.snapshot().state, PlaybackState::Buffering);
    h.player.play(fast.clone()).await.unwrap();

    // No sleeping before the gate opens: virtual time is held while the
    // gated resolution occupies a blocking thread
    h.wait_for("fast playing", |s| s.state == PlaybackState::Playing).await;
    gate.open();
    advance(0.1).await;

    let snapshot = h.snapshot();
    assert_eq!(snapshot.current_track_id(), Some(fast.id));
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(h.probe.load_count(ChannelId::A), 1);
    assert_eq!(h.probe.load_count(ChannelId::B), 0);
    assert_eq!(h.resolver.calls(), 2);

    let started: Vec<_> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            PlayerEvent::TrackStarted { track_id, .. } => Some(track_id),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![fast.id]);
}

#[tokio::test(start_paused = true)]
async fn test_seek_reports_target_immediately() {
    let h = Harness::start();
    let a = h.ready("a", 30.0);

    h.player.play(a).await.unwrap();
    h.wait_for("playing", |s| s.state == PlaybackState::Playing).await;
    advance(2.0).await;

    h.player.seek(5.0).await.unwrap();
    let snapshot = h.snapshot();
    assert_eq!(snapshot.current_time, 5.0);
    assert!(snapshot.is_seeking);
    assert_eq!(h.probe.loaded_offset(ChannelId::A), Some(5.0));

    advance(0.3).await;
    let snapshot = h.snapshot();
    assert!(!snapshot.is_seeking);
    assert!(snapshot.current_time >= 5.0);

    // Out-of-range targets clamp to the track
    h.player.seek(-3.0).await.unwrap();
    assert_eq!(h.snapshot().current_time, 0.0);
    h.player.seek(99.0).await.unwrap();
    assert_eq!(h.snapshot().current_time, 30.0);

    assert!(h.player.seek(f64::NAN).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_end_inside_seek_grace_is_replayed_after_it() {
    let h = Harness::start();
    let a = h.ready("a", 10.0);

    h.player.play(a).await.unwrap();
    h.wait_for("playing", |s| s.state == PlaybackState::Playing).await;
    advance(1.0).await;

    h.player.seek(9.9).await.unwrap();
    advance(0.15).await;
    // The source has ended but the grace window holds the signal back
    assert_eq!(h.snapshot().state, PlaybackState::Playing);
    assert!(h.snapshot().is_seeking);

    advance(0.1).await;
    let snapshot = h.snapshot();
    assert!(!snapshot.is_seeking);
    assert_eq!(snapshot.state, PlaybackState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_previous_early_returns_to_history() {
    let mut h = Harness::start();
    let a = h.ready("a", 30.0);
    let b = h.ready("b", 30.0);

    h.player.play(a.clone()).await.unwrap();
    h.player.add_to_queue(b.clone()).await.unwrap();
    h.wait_for("playing a", |s| s.state == PlaybackState::Playing).await;
    advance(5.0).await;

    h.player.next().await.unwrap();
    h.wait_for("playing b", |s| {
        s.state == PlaybackState::Playing && s.current_track_id() == Some(b.id)
    })
    .await;
    advance(1.0).await;
    h.drain_events();

    h.player.previous().await.unwrap();
    h.wait_for("back on a", |s| {
        s.state == PlaybackState::Playing && s.current_track_id() == Some(a.id)
    })
    .await;

    let snapshot = h.snapshot();
    assert_eq!(snapshot.upcoming.first().map(|t| t.id), Some(b.id));
    assert_eq!(snapshot.history_len, 0);
    assert!(!snapshot.is_transitioning);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        PlayerEvent::TrackStarted { track_id, crossfade: false, .. } if *track_id == a.id
    )));
}

#[tokio::test(start_paused = true)]
async fn test_previous_late_restarts_current_track() {
    let h = Harness::start();
    let a = h.ready("a", 30.0);
    let b = h.ready("b", 30.0);

    h.player.play(a).await.unwrap();
    h.player.add_to_queue(b.clone()).await.unwrap();
    h.wait_for("playing a", |s| s.state == PlaybackState::Playing).await;
    h.player.next().await.unwrap();
    h.wait_for("playing b", |s| {
        s.state == PlaybackState::Playing && s.current_track_id() == Some(b.id)
    })
    .await;
    advance(5.0).await;

    h.player.previous().await.unwrap();
    let snapshot = h.snapshot();
    assert_eq!(snapshot.current_track_id(), Some(b.id));
    assert_eq!(snapshot.current_time, 0.0);
    assert_eq!(snapshot.history_len, 1);
}

#[tokio::test(start_paused = true)]
async fn test_next_with_empty_queue_stops() {
    let h = Harness::start();
    let a = h.ready("a", 30.0);

    h.player.play(a.clone()).await.unwrap();
    h.wait_for("playing", |s| s.state == PlaybackState::Playing).await;

    h.player.next().await.unwrap();
    let snapshot = h.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Stopped);
    assert_eq!(snapshot.current_track_id(), Some(a.id));
    assert!(!h.probe.is_running(ChannelId::A));
    assert!(!h.probe.is_running(ChannelId::B));
}
