//! Track values handed to the player by the library collaborator
//!
//! The player never creates or persists tracks itself. It receives them by
//! value, keeps clones in its queue and history, and only ever flips the
//! favorite flag (forwarding the change to whoever owns the library).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stable track identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub Uuid);

impl TrackId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for TrackId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A playable track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable identifier
    pub id: TrackId,

    /// Audio file location
    pub path: PathBuf,

    pub title: String,

    #[serde(default)]
    pub artist: Option<String>,

    #[serde(default)]
    pub album: Option<String>,

    /// Duration reported by the library (seconds); the decoded source wins
    /// whenever it knows better
    #[serde(default)]
    pub duration_hint: Option<f64>,

    #[serde(default)]
    pub favorite: bool,

    /// Artwork reference supplied by the library (URL or file path)
    #[serde(default)]
    pub artwork: Option<String>,
}

impl Track {
    /// Build a track for a bare file, using the file stem as its title
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            id: TrackId::new(),
            path,
            title,
            artist: None,
            album: None,
            duration_hint: None,
            favorite: false,
            artwork: None,
        }
    }

    pub fn with_duration_hint(mut self, seconds: f64) -> Self {
        self.duration_hint = Some(seconds);
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    /// Lower-cased file extension, if any
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }
}

/// Lower-cased extension of a path
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
