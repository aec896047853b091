//! # Cadence Audio Player Library (cadence-ap)
//!
//! Dual-channel playback engine with crossfading, a play queue, and an HTTP
//! control surface.
//!
//! **Architecture:**
//! - `audio`: source resolution (symphonia), the output graph (cpal + rubato
//!   + ringbuf, or a headless clock), and the two-slot mixer
//! - `playback`: the session actor, fades, position ticker, and queue
//! - `db`: last-session and favorite persistence (sqlx/SQLite)
//! - `api` and `remote`: HTTP/SSE endpoints and the media-remote bridge

pub mod api;
pub mod audio;
pub mod config;
pub mod db;
pub mod error;
pub mod playback;
pub mod remote;

pub use error::{Error, Result};
pub use playback::{PlaybackEngine, PlayerHandle, PlayerSnapshot, SavedSession};
