//! Playback session: dual channels, fades, queue, and the engine actor

pub mod channel;
pub mod engine;
pub mod fader;
pub mod queue;
pub mod state;
pub mod ticker;

pub use engine::{PlaybackEngine, PlayerHandle, SessionPersistence};
pub use state::{PlayerSnapshot, SavedSession};
