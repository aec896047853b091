//! Audio Player (cadence-ap) - Main entry point
//!
//! Loads configuration, restores the last session, starts the playback
//! engine and the HTTP server, and queues any files given on the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_ap::api::{self, AppContext};
use cadence_ap::audio::{CpalBackend, HeadlessBackend, OutputBackend, SourceResolver};
use cadence_ap::config::{Config, ConfigOverrides};
use cadence_ap::db::{self, Store};
use cadence_ap::playback::{PlaybackEngine, SavedSession};
use cadence_ap::remote::{LogPublisher, NowPlayingBridge};
use cadence_common::config::locate_config_file;
use cadence_common::Track;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for cadence-ap
#[derive(Parser, Debug)]
#[command(name = "cadence-ap")]
#[command(about = "Crossfading audio player with an HTTP control API")]
#[command(version)]
struct Args {
    /// Audio files to play, in order
    files: Vec<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CADENCE_PORT")]
    port: Option<u16>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "CADENCE_DATABASE")]
    database: Option<PathBuf>,

    /// Run without an audio device
    #[arg(long)]
    headless: bool,

    /// Output device name
    #[arg(long, env = "CADENCE_AUDIO_DEVICE")]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = locate_config_file(args.config.as_deref());
    let config = Config::load(
        config_path.as_deref(),
        ConfigOverrides {
            database_path: args.database,
            port: args.port,
            audio_device: args.device,
            headless: args.headless,
        },
    )
    .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting cadence-ap {} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let pool = db::connect(&config.database_path)
        .await
        .context("Failed to open database")?;
    let store = Store::new(pool);

    let backend = open_backend(&config);
    let output = backend.name();

    let (player, engine_task) =
        PlaybackEngine::builder(backend, Arc::new(SourceResolver::with_defaults()))
            .tuning(config.playback.clone())
            .persistence(Arc::new(store.clone()))
            .spawn()
            .context("Failed to start playback engine")?;

    match store.sessions().load().await {
        Ok(saved) => player.restore(saved).await?,
        Err(e) => warn!("Ignoring unreadable saved session: {}", e),
    }

    let bridge = NowPlayingBridge::spawn(&player, LogPublisher);

    if !args.files.is_empty() {
        let tracks: Vec<Track> = args.files.into_iter().map(Track::from_path).collect();
        info!("Queueing {} files from the command line", tracks.len());
        if let Err(e) = player.start_playlist(tracks).await {
            error!("Could not start playlist: {}", e);
        }
    }

    let ctx = AppContext {
        player: player.clone(),
        output,
    };
    api::serve(ctx, config.port, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Persist where we were before tearing the session down
    let snapshot = player.snapshot();
    let saved = SavedSession {
        track: snapshot.current_track,
        elapsed: snapshot.current_time,
        volume: snapshot.volume,
    };
    if let Err(e) = store.sessions().save(&saved).await {
        warn!("Failed to save session on exit: {}", e);
    }

    bridge.stop();
    player.shutdown().await?;
    engine_task.await.context("Playback engine task panicked")?;

    info!("Shutdown complete");
    Ok(())
}

/// Real device output, or the headless clock when requested or unavailable
fn open_backend(config: &Config) -> Box<dyn OutputBackend> {
    if config.headless {
        info!("Running headless (no audio device)");
        return Box::new(HeadlessBackend::new());
    }
    match CpalBackend::new(config.audio_device.clone()) {
        Ok(backend) => {
            info!("Audio output at {} Hz", backend.sample_rate());
            Box::new(backend)
        }
        Err(e) => {
            warn!("Audio output unavailable ({}); falling back to headless", e);
            Box::new(HeadlessBackend::new())
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
