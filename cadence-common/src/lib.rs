//! # Cadence Common Library
//!
//! Shared code for the Cadence player and any front end that drives it:
//! - Track values handed over by the library collaborator
//! - Event types (`PlayerEvent`) and the broadcast `EventBus`
//! - Configuration file discovery
//! - Time helpers for display and timestamps

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod time;
pub mod track;

pub use error::{Error, Result};
pub use track::{Track, TrackId};
