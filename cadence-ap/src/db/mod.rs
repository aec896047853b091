//! SQLite persistence
//!
//! Provides the last-session store, favorite flags, and the `Store` the
//! playback engine persists through.

pub mod favorites;
pub mod init;
pub mod settings;

pub use favorites::FavoriteStore;
pub use init::initialize_database;
pub use settings::SessionStore;

use crate::error::Result;
use crate::playback::{SavedSession, SessionPersistence};
use cadence_common::TrackId;
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open (creating if needed) the database file and initialize its tables
pub async fn connect(path: &Path) -> Result<Pool<Sqlite>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Some(Duration::from_secs(60)))
        .connect(&db_url)
        .await?;

    info!("Connected to database: {}", path.display());
    initialize_database(&pool).await?;
    Ok(pool)
}

/// Session and favorite persistence backed by one pool
#[derive(Clone)]
pub struct Store {
    sessions: SessionStore,
    favorites: FavoriteStore,
}

impl Store {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            sessions: SessionStore::new(pool.clone()),
            favorites: FavoriteStore::new(pool),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn favorites(&self) -> &FavoriteStore {
        &self.favorites
    }
}

impl SessionPersistence for Store {
    fn save_session(&self, saved: SavedSession) -> BoxFuture<'static, Result<()>> {
        let sessions = self.sessions.clone();
        async move { sessions.save(&saved).await }.boxed()
    }

    fn set_favorite(&self, track_id: TrackId, favorite: bool) -> BoxFuture<'static, Result<()>> {
        let favorites = self.favorites.clone();
        async move { favorites.set(track_id, favorite).await }.boxed()
    }
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> Pool<Sqlite> {
    // One connection: every in-memory connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    initialize_database(&pool).await.unwrap();
    pool
}
