//! HTTP request handlers
//!
//! Implements REST API endpoints for playback control.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::playback::PlayerSnapshot;
use crate::remote::{dispatch_remote, NowPlaying, RemoteCommand};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cadence_common::events::LoopMode;
use cadence_common::Track;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    build: String,
    output: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// A full track from the library, or a bare file path
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TrackRequest {
    Track(Track),
    Path { path: PathBuf },
}

impl TrackRequest {
    fn into_track(self) -> Track {
        match self {
            TrackRequest::Track(track) => track,
            TrackRequest::Path { path } => Track::from_path(path),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    #[serde(default)]
    track: Option<TrackRequest>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistRequest {
    tracks: Vec<TrackRequest>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position: f64,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: f32,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    volume: f32,
    muted: bool,
}

#[derive(Debug, Serialize)]
pub struct LoopModeResponse {
    loop_mode: LoopMode,
}

#[derive(Debug, Serialize)]
pub struct ShuffleResponse {
    shuffle: bool,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    upcoming: Vec<Track>,
    history_len: usize,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::Queue(_) => StatusCode::BAD_REQUEST,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::EngineClosed => StatusCode::SERVICE_UNAVAILABLE,
        Error::SourceUnavailable { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            kind: e.kind().to_string(),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health and State
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "cadence-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: format!(
            "{} {} ({})",
            env!("GIT_HASH"),
            env!("BUILD_TIMESTAMP"),
            env!("BUILD_PROFILE")
        ),
        output: ctx.output.to_string(),
    })
}

/// GET /playback/state - Full session snapshot
pub async fn get_state(State(ctx): State<AppContext>) -> Json<PlayerSnapshot> {
    Json(ctx.player.snapshot())
}

/// GET /now-playing - Metadata for the OS media surface (null when idle)
pub async fn now_playing(State(ctx): State<AppContext>) -> Json<Option<NowPlaying>> {
    Json(NowPlaying::from_snapshot(&ctx.player.snapshot()))
}

// ============================================================================
// Audio Endpoints
// ============================================================================

/// GET /audio/devices - List available audio output devices
pub async fn list_audio_devices() -> ApiResult<DeviceListResponse> {
    use crate::audio::output::AudioOutput;

    let devices = tokio::task::spawn_blocking(AudioOutput::list_devices)
        .await
        .map_err(|e| api_error(Error::AudioOutput(e.to_string())))?
        .map_err(api_error)?;
    info!("Found {} audio devices", devices.len());
    Ok(Json(DeviceListResponse { devices }))
}

/// POST /audio/volume - Set master volume (0.0-1.0)
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> ApiResult<VolumeResponse> {
    ctx.player.set_volume(req.volume).await.map_err(api_error)?;
    let snapshot = ctx.player.snapshot();
    Ok(Json(VolumeResponse {
        volume: snapshot.volume,
        muted: snapshot.is_muted,
    }))
}

/// POST /audio/mute - Toggle mute
pub async fn toggle_mute(State(ctx): State<AppContext>) -> ApiResult<VolumeResponse> {
    let muted = ctx.player.toggle_mute().await.map_err(api_error)?;
    Ok(Json(VolumeResponse {
        volume: ctx.player.snapshot().volume,
        muted,
    }))
}

// ============================================================================
// Playback Control
// ============================================================================

/// POST /playback/play - Play a track, or resume/restart without a body
pub async fn play(
    State(ctx): State<AppContext>,
    body: Option<Json<PlayRequest>>,
) -> ApiResult<StatusResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let result = match request.track {
        Some(track) => ctx.player.play(track.into_track()).await,
        None => dispatch_remote(&ctx.player, RemoteCommand::Play).await,
    };
    result.map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    dispatch_remote(&ctx.player, RemoteCommand::Pause)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/toggle
pub async fn toggle(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    dispatch_remote(&ctx.player, RemoteCommand::Toggle)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/next
pub async fn next(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    dispatch_remote(&ctx.player, RemoteCommand::Next)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/previous
pub async fn previous(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    dispatch_remote(&ctx.player, RemoteCommand::Previous)
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/stop
pub async fn stop(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.player.stop().await.map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/seek - Jump to a position in seconds
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<StatusResponse> {
    dispatch_remote(&ctx.player, RemoteCommand::SeekTo(req.position))
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/playlist - Replace the queue and start its first track
pub async fn start_playlist(
    State(ctx): State<AppContext>,
    Json(req): Json<PlaylistRequest>,
) -> ApiResult<StatusResponse> {
    let tracks = req.tracks.into_iter().map(TrackRequest::into_track).collect();
    ctx.player.start_playlist(tracks).await.map_err(api_error)?;
    Ok(ok())
}

/// POST /playback/loop - Advance the loop mode
pub async fn cycle_loop_mode(State(ctx): State<AppContext>) -> ApiResult<LoopModeResponse> {
    let loop_mode = ctx.player.cycle_loop_mode().await.map_err(api_error)?;
    Ok(Json(LoopModeResponse { loop_mode }))
}

/// POST /playback/shuffle
pub async fn toggle_shuffle(State(ctx): State<AppContext>) -> ApiResult<ShuffleResponse> {
    let shuffle = ctx.player.toggle_shuffle().await.map_err(api_error)?;
    Ok(Json(ShuffleResponse { shuffle }))
}

/// POST /playback/favorite - Flip the current track's favorite flag
pub async fn toggle_favorite(State(ctx): State<AppContext>) -> ApiResult<FavoriteResponse> {
    let favorite = ctx.player.toggle_favorite().await.map_err(api_error)?;
    Ok(Json(FavoriteResponse { favorite }))
}

// ============================================================================
// Queue
// ============================================================================

/// GET /queue
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<QueueResponse> {
    let snapshot = ctx.player.snapshot();
    Json(QueueResponse {
        upcoming: snapshot.upcoming,
        history_len: snapshot.history_len,
    })
}

/// POST /queue - Append a track
pub async fn add_to_queue(
    State(ctx): State<AppContext>,
    Json(req): Json<TrackRequest>,
) -> ApiResult<StatusResponse> {
    ctx.player
        .add_to_queue(req.into_track())
        .await
        .map_err(api_error)?;
    Ok(ok())
}

/// DELETE /queue - Empty the upcoming queue
pub async fn clear_queue(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.player.clear_queue().await.map_err(api_error)?;
    Ok(ok())
}

/// DELETE /queue/:index - Remove one upcoming track
pub async fn remove_from_queue(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> ApiResult<Track> {
    let removed = ctx
        .player
        .remove_from_queue(index)
        .await
        .map_err(api_error)?;
    Ok(Json(removed))
}
