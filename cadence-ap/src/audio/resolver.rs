//! Source resolution: turning a `Track` into something an output path can play
//!
//! Backends are tried in priority order. The native streaming backend yields a
//! seekable framed source; the memory backend decodes the whole file when the
//! container cannot report framing. When every backend declines or fails the
//! result is `SourceUnavailable`.
//!
//! Resolution does blocking file I/O and must run off the engine task
//! (the engine calls it from `spawn_blocking`).

use crate::audio::decoder::{decode_file, probe_stream};
use crate::audio::source::AudioSource;
use crate::error::{Error, Result};
use cadence_common::track::extension_of;
use cadence_common::Track;
use std::path::Path;
use tracing::{debug, warn};

/// A format-specific way of opening a track
pub trait SourceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap pre-check; a backend is only invoked if this returns true
    fn can_attempt(&self, path: &Path) -> bool;

    fn open(&self, track: &Track) -> Result<AudioSource>;
}

/// Engine-facing resolution contract
pub trait TrackResolver: Send + Sync + 'static {
    fn resolve(&self, track: &Track) -> Result<AudioSource>;
}

/// Extensions whose containers normally report frame counts
const STREAMING_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "mp4", "aac"];

/// Native seekable-file backend (symphonia with framing)
#[derive(Debug, Default)]
pub struct StreamingBackend;

impl SourceBackend for StreamingBackend {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn can_attempt(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| STREAMING_EXTENSIONS.contains(&ext.as_str()))
    }

    fn open(&self, track: &Track) -> Result<AudioSource> {
        let info = probe_stream(&track.path)?;
        debug!(
            "Streaming source for '{}': {} Hz, {} frames",
            track.title, info.sample_rate, info.total_frames
        );
        Ok(AudioSource::framed(track.path.clone(), info))
    }
}

/// Fallback decode-to-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl SourceBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn can_attempt(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn open(&self, track: &Track) -> Result<AudioSource> {
        let buffer = decode_file(&track.path)?;
        Ok(AudioSource::buffered(buffer))
    }
}

/// Ordered list of backends
pub struct SourceResolver {
    backends: Vec<Box<dyn SourceBackend>>,
}

impl SourceResolver {
    pub fn new(backends: Vec<Box<dyn SourceBackend>>) -> Self {
        Self { backends }
    }

    /// Streaming first, memory as fallback
    pub fn with_defaults() -> Self {
        Self::new(vec![Box::new(StreamingBackend), Box::new(MemoryBackend)])
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TrackResolver for SourceResolver {
    fn resolve(&self, track: &Track) -> Result<AudioSource> {
        let mut failures = Vec::new();

        for backend in &self.backends {
            if !backend.can_attempt(&track.path) {
                debug!("Backend '{}' declined {}", backend.name(), track.path.display());
                continue;
            }

            match backend.open(track) {
                Ok(source) => {
                    debug!(
                        "Resolved '{}' via {} backend ({} source, {:.2}s)",
                        track.title,
                        backend.name(),
                        source.kind(),
                        source.duration()
                    );
                    return Ok(source);
                }
                Err(e) => {
                    warn!("Backend '{}' failed for '{}': {}", backend.name(), track.title, e);
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        let reason = if failures.is_empty() {
            format!("no backend can open {}", track.path.display())
        } else {
            failures.join("; ")
        };
        Err(Error::SourceUnavailable {
            track: track.title.clone(),
            reason,
        })
    }
}
