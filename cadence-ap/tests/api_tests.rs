//! HTTP API tests, driven through the router without a socket

mod helpers;

use axum::body::Body;
use axum::Router;
use cadence_ap::api::{build_router, AppContext};
use cadence_common::events::PlaybackState;
use helpers::Harness;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

fn router(h: &Harness) -> Router {
    build_router(AppContext {
        player: h.player.clone(),
        output: "headless",
    })
}

/// Send one request; returns the status and the JSON body (Null when empty)
async fn make_request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => builder
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test(start_paused = true)]
async fn test_health() {
    let h = Harness::start();
    let app = router(&h);

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "cadence-ap");
    assert_eq!(body["output"], "headless");
}

#[tokio::test(start_paused = true)]
async fn test_play_by_path_and_read_state() {
    let h = Harness::start();
    h.ready("a", 30.0);
    let app = router(&h);

    let (status, body) = make_request(&app, Method::GET, "/now-playing", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/playback/play",
        Some(json!({ "track": { "path": "/virtual/a.wav" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    h.wait_for("playing", |s| s.state == PlaybackState::Playing).await;

    let (status, body) = make_request(&app, Method::GET, "/playback/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "playing");
    assert_eq!(body["current_track"]["title"], "a");
    assert_eq!(body["duration"], 30.0);

    let (_, body) = make_request(&app, Method::GET, "/now-playing", None).await;
    assert_eq!(body["title"], "a");
    assert_eq!(body["is_playing"], true);

    // Bodyless play on a paused session resumes it
    make_request(&app, Method::POST, "/playback/pause", None).await;
    assert_eq!(h.snapshot().state, PlaybackState::Paused);
    let (status, _) = make_request(&app, Method::POST, "/playback/play", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.snapshot().state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_queue_endpoints() {
    let h = Harness::start();
    let app = router(&h);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/queue",
        Some(json!({ "path": "/virtual/b.wav" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = make_request(&app, Method::GET, "/queue", None).await;
    assert_eq!(body["upcoming"].as_array().unwrap().len(), 1);
    assert_eq!(body["history_len"], 0);

    let (status, body) = make_request(&app, Method::DELETE, "/queue/5", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "queue");

    let (status, body) = make_request(&app, Method::DELETE, "/queue/0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "b");

    let (status, _) = make_request(&app, Method::DELETE, "/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.snapshot().upcoming.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_settings_endpoints() {
    let h = Harness::start();
    let app = router(&h);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/audio/volume",
        Some(json!({ "volume": 0.25 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "volume": 0.25, "muted": false }));

    let (_, body) = make_request(&app, Method::POST, "/audio/mute", None).await;
    assert_eq!(body["muted"], true);

    let (_, body) = make_request(&app, Method::POST, "/playback/loop", None).await;
    assert_eq!(body["loop_mode"], "all");

    let (_, body) = make_request(&app, Method::POST, "/playback/shuffle", None).await;
    assert_eq!(body["shuffle"], true);
}

#[tokio::test(start_paused = true)]
async fn test_error_statuses() {
    let h = Harness::start();
    let app = router(&h);

    let (status, body) = make_request(&app, Method::POST, "/playback/favorite", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/playback/playlist",
        Some(json!({ "tracks": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "queue");

    h.player.shutdown().await.unwrap();
    let (status, body) = make_request(&app, Method::POST, "/playback/next", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "engine_closed");
}

#[tokio::test(start_paused = true)]
async fn test_event_stream_forwards_events() {
    let h = Harness::start();
    let app = router(&h);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/events")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    h.player.cycle_loop_mode().await.unwrap();

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("LoopModeChanged"), "{}", text);
    assert!(text.contains("\"mode\":\"all\""), "{}", text);
}
