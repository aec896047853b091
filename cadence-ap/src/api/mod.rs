//! HTTP control surface
//!
//! REST endpoints for the public playback operations plus an SSE stream of
//! player events. Every handler goes through `PlayerHandle`.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, serve, AppContext};
