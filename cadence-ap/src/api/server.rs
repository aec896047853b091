//! HTTP server setup and routing
//!
//! Sets up Axum HTTP server with routes for control endpoints and SSE.

use crate::error::{Error, Result};
use crate::playback::PlayerHandle;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
///
/// **Note:** AppContext implements Clone, which gives us `FromRef<AppContext>` for free
/// via Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub player: PlayerHandle,
    /// Name of the output backend in use
    pub output: &'static str,
}

/// Build the router with every endpoint attached
pub fn build_router(ctx: AppContext) -> Router {
    use super::{handlers, sse};

    Router::new()
        .route("/health", get(handlers::health))
        .route("/now-playing", get(handlers::now_playing))
        // Audio
        .route("/audio/devices", get(handlers::list_audio_devices))
        .route("/audio/volume", post(handlers::set_volume))
        .route("/audio/mute", post(handlers::toggle_mute))
        // Playback control
        .route("/playback/state", get(handlers::get_state))
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/toggle", post(handlers::toggle))
        .route("/playback/next", post(handlers::next))
        .route("/playback/previous", post(handlers::previous))
        .route("/playback/stop", post(handlers::stop))
        .route("/playback/seek", post(handlers::seek))
        .route("/playback/playlist", post(handlers::start_playlist))
        .route("/playback/loop", post(handlers::cycle_loop_mode))
        .route("/playback/shuffle", post(handlers::toggle_shuffle))
        .route("/playback/favorite", post(handlers::toggle_favorite))
        // Queue
        .route(
            "/queue",
            get(handlers::get_queue)
                .post(handlers::add_to_queue)
                .delete(handlers::clear_queue),
        )
        .route("/queue/:index", delete(handlers::remove_from_queue))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run HTTP API server until `shutdown` resolves
pub async fn serve(
    ctx: AppContext,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
