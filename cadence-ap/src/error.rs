//! Error types for cadence-ap
//!
//! Defines the player's error taxonomy using thiserror for clear error propagation.
//! Stale completions (resolution results or end-of-source signals for a
//! schedule the session has moved past) are not errors and never appear here.

use thiserror::Error;

/// Main error type for cadence-ap
#[derive(Error, Debug)]
pub enum Error {
    /// No resolver backend could produce a playable source for the track
    #[error("Source unavailable for '{track}': {reason}")]
    SourceUnavailable { track: String, reason: String },

    /// The audio subsystem rejected a schedule call
    #[error("Schedule failed: {0}")]
    ScheduleFailed(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Queue management errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// The engine task has exited and no longer accepts commands
    #[error("Playback engine is not running")]
    EngineClosed,

    /// Errors bubbled up from cadence-common
    #[error(transparent)]
    Common(#[from] cadence_common::Error),
}

impl Error {
    /// Short machine-readable name used in `PlaybackFailed` events and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SourceUnavailable { .. } => "source_unavailable",
            Error::ScheduleFailed(_) => "schedule_failed",
            Error::Decode(_) => "decode",
            Error::AudioOutput(_) => "audio_output",
            Error::Queue(_) => "queue",
            Error::InvalidState(_) => "invalid_state",
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Http(_) => "http",
            Error::EngineClosed => "engine_closed",
            Error::Common(_) => "common",
        }
    }
}

/// Convenience Result type using cadence-ap Error
pub type Result<T> = std::result::Result<T, Error>;
