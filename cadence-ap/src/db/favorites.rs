//! Favorite flags, keyed by track id

use crate::error::Result;
use cadence_common::TrackId;
use sqlx::{Pool, Sqlite};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct FavoriteStore {
    pool: Pool<Sqlite>,
}

impl FavoriteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn set(&self, track_id: TrackId, favorite: bool) -> Result<()> {
        if favorite {
            sqlx::query(
                r#"
                INSERT INTO favorites (track_id) VALUES (?)
                ON CONFLICT(track_id) DO UPDATE SET updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(track_id.0.to_string())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM favorites WHERE track_id = ?")
                .bind(track_id.0.to_string())
                .execute(&self.pool)
                .await?;
        }
        debug!("Favorite {} = {}", track_id, favorite);
        Ok(())
    }

    pub async fn is_favorite(&self, track_id: TrackId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM favorites WHERE track_id = ?)")
                .bind(track_id.0.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// All favorite track ids; rows that are not UUIDs are skipped
    pub async fn list(&self) -> Result<Vec<TrackId>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT track_id FROM favorites ORDER BY updated_at, track_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .iter()
            .filter_map(|s| Uuid::parse_str(s).ok())
            .map(TrackId)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn test_set_and_clear_favorite() {
        let store = FavoriteStore::new(memory_pool().await);
        let id = TrackId::new();

        assert!(!store.is_favorite(id).await.unwrap());
        store.set(id, true).await.unwrap();
        assert!(store.is_favorite(id).await.unwrap());

        // Setting twice keeps a single row
        store.set(id, true).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![id]);

        store.set(id, false).await.unwrap();
        assert!(!store.is_favorite(id).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }
}
