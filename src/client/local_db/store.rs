//! # Key/Value Store and Id Mappings
//!
//! Session state persisted as JSON under stable string keys, plus the table
//! that resolves local placeholder ids to the ids the server assigned once a
//! queued start was replayed.

use crate::client::local_db::LocalDatabase;
use crate::shared::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Stable keys used in the local store
pub mod keys {
    pub const AUTH_TOKEN: &str = "authToken";
    pub const USER: &str = "user";
    pub const CACHED_ACTIVITIES: &str = "cachedActivities";
    pub const CACHED_MATERIALS: &str = "cachedMaterials";
    pub const CACHED_EQUIPMENT: &str = "cachedEquipment";
    /// Checkpoint of the active operation, if any
    pub const ACTIVE_OPERATION: &str = "activeOperation";
    pub const LAST_SYNC_TIME: &str = "lastSyncTime";
    pub const SESSION_TOTAL: &str = "sessionTotalSeconds";
}

impl LocalDatabase {
    /// Store a value as JSON, replacing any previous value
    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;

        sqlx::query(
            "INSERT INTO local_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a JSON value; a value that no longer decodes reads as absent
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM local_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some((json,)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("[QUEUE] Ignoring unreadable stored value for '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remember which server id a local placeholder id became
    pub async fn record_id_mapping(&self, local_id: &str, server_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO id_mappings (local_id, server_id, mapped_at) VALUES (?, ?, ?)
             ON CONFLICT(local_id) DO UPDATE SET server_id = excluded.server_id, mapped_at = excluded.mapped_at",
        )
        .bind(local_id)
        .bind(server_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!("[QUEUE] Mapped {} -> {}", local_id, server_id);
        Ok(())
    }

    /// Server id for a local id, if its start has synced
    pub async fn resolve_id(&self, local_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT server_id FROM id_mappings WHERE local_id = ?")
                .bind(local_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(server_id,)| server_id))
    }

    /// Forget mappings no queued action refers to any more
    pub async fn prune_id_mappings(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM id_mappings
             WHERE local_id NOT IN (SELECT operation_ref FROM offline_queue)",
        )
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::debug!("[QUEUE] Pruned {} id mappings", result.rows_affected());
        }
        Ok(result.rows_affected())
    }

    pub async fn id_mappings(&self) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT local_id, server_id FROM id_mappings ORDER BY mapped_at ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}
