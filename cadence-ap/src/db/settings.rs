//! Settings database access
//!
//! Read/write settings from the settings table (key-value store), and the
//! last-session record built on top of it.

use crate::error::{Error, Result};
use crate::playback::SavedSession;
use cadence_common::Track;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::debug;

const LAST_TRACK_KEY: &str = "last_track";
const LAST_ELAPSED_KEY: &str = "last_elapsed_seconds";
const VOLUME_KEY: &str = "volume_level";

/// Last played track, elapsed time, and volume
#[derive(Clone)]
pub struct SessionStore {
    pool: Pool<Sqlite>,
}

impl SessionStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Load the last session; missing keys fall back to defaults
    pub async fn load(&self) -> Result<SavedSession> {
        let defaults = SavedSession::default();

        let track = match get_setting::<String>(&self.pool, LAST_TRACK_KEY).await? {
            Some(json) => Some(serde_json::from_str::<Track>(&json).map_err(|e| {
                Error::Config(format!("Invalid track JSON in '{}': {}", LAST_TRACK_KEY, e))
            })?),
            None => None,
        };
        let elapsed = get_setting::<f64>(&self.pool, LAST_ELAPSED_KEY)
            .await?
            .unwrap_or(defaults.elapsed)
            .max(0.0);
        let volume = get_setting::<f32>(&self.pool, VOLUME_KEY)
            .await?
            .unwrap_or(defaults.volume)
            .clamp(0.0, 1.0);

        Ok(SavedSession {
            track,
            elapsed,
            volume,
        })
    }

    pub async fn save(&self, saved: &SavedSession) -> Result<()> {
        match &saved.track {
            Some(track) => {
                let json = serde_json::to_string(track)
                    .map_err(|e| Error::Config(format!("Cannot encode track: {}", e)))?;
                set_setting(&self.pool, LAST_TRACK_KEY, json).await?;
            }
            None => delete_setting(&self.pool, LAST_TRACK_KEY).await?,
        }
        set_setting(&self.pool, LAST_ELAPSED_KEY, saved.elapsed.max(0.0)).await?;
        set_setting(&self.pool, VOLUME_KEY, saved.volume.clamp(0.0, 1.0)).await?;

        debug!(
            "Saved session: track={:?} elapsed={:.2}s volume={:.2}",
            saved.track.as_ref().map(|t| &t.title),
            saved.elapsed,
            saved.volume
        );
        Ok(())
    }
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database.
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn delete_setting(db: &Pool<Sqlite>, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(db)
        .await?;
    Ok(())
}
