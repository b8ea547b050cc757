//! # Durable Action Queue
//!
//! Append-only log of start/stop actions recorded while the backend was out
//! of reach. Rows are replayed in the order they were appended (the `seq`
//! column) and are removed only when the caller acknowledges them, so a
//! crash in the middle of a sync pass loses nothing.
//!
//! ## Features
//!
//! - **Persistent Queue**: Actions survive app restarts
//! - **Strict Ordering**: Replay order equals append order; nothing is reordered
//! - **Explicit Acknowledgement**: Drained actions stay queued until acknowledged
//! - **Attempt Tracking**: Failed attempts record a timestamp and error message
//!
//! ## Usage
//!
//! ```rust,no_run
//! use minetrack::client::local_db::{LocalDatabase, QueuedAction};
//! use minetrack::shared::StopOperationRequest;
//!
//! # async fn example(db: LocalDatabase) -> minetrack::shared::Result<()> {
//! db.append_action(&QueuedAction::Stop {
//!     operation_id: "665f1c...".to_string(),
//!     request: StopOperationRequest::default(),
//!     local_end_time: chrono::Utc::now(),
//! })
//! .await?;
//!
//! for pending in db.drain_in_order().await? {
//!     // replay against the server...
//!     db.acknowledge(&pending.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::LocalDatabase;
use crate::shared::models::{StartOperationRequest, StopOperationRequest};
use crate::shared::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// An operator action waiting to be replayed against the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueuedAction {
    /// Start an operation; `local_id` is the placeholder id handed to the UI
    Start {
        local_id: String,
        request: StartOperationRequest,
        queued_at: DateTime<Utc>,
    },
    /// Stop an operation; `operation_id` may be a local placeholder id
    Stop {
        operation_id: String,
        request: StopOperationRequest,
        local_end_time: DateTime<Utc>,
    },
}

impl QueuedAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            QueuedAction::Start { .. } => ActionKind::Start,
            QueuedAction::Stop { .. } => ActionKind::Stop,
        }
    }

    /// The operation this action belongs to (local id for starts)
    pub fn operation_ref(&self) -> &str {
        match self {
            QueuedAction::Start { local_id, .. } => local_id,
            QueuedAction::Stop { operation_id, .. } => operation_id,
        }
    }
}

/// Kind of queued action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    Stop,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued action with its bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// Queue entry id
    pub id: String,
    /// Replay position
    pub seq: i64,
    pub action: QueuedAction,
    pub created_at: String,
    pub attempt_count: i64,
    pub last_attempt: Option<String>,
    pub error_message: Option<String>,
}

const SELECT_PENDING: &str = "SELECT seq, id, data, created_at, attempt_count, last_attempt, error_message
     FROM offline_queue
     ORDER BY seq ASC";

impl LocalDatabase {
    /// Append an action to the end of the queue
    pub async fn append_action(&self, action: &QueuedAction) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let data = serde_json::to_string(action)?;

        sqlx::query(
            "INSERT INTO offline_queue (id, action_kind, operation_ref, data, created_at, attempt_count)
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(&id)
        .bind(action.kind().as_str())
        .bind(action.operation_ref())
        .bind(&data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "[QUEUE] Queued {} action for operation {} (entry {})",
            action.kind(),
            action.operation_ref(),
            id
        );
        Ok(id)
    }

    /// Snapshot of the queue in replay order
    ///
    /// Nothing is removed except rows whose payload can no longer be decoded;
    /// those could never be replayed and would otherwise sit at the head of
    /// the queue forever.
    pub async fn drain_in_order(&self) -> Result<Vec<PendingAction>> {
        let rows = sqlx::query(SELECT_PENDING).fetch_all(&self.pool).await?;

        let mut actions = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row(&row)? {
                Ok(action) => actions.push(action),
                Err((id, error)) => {
                    tracing::warn!("[QUEUE] Dropping undecodable queue entry {}: {}", id, error);
                    self.acknowledge(&id).await?;
                }
            }
        }

        Ok(actions)
    }

    /// Every decodable queued action, for diagnostics
    pub async fn peek_all(&self) -> Result<Vec<PendingAction>> {
        let rows = sqlx::query(SELECT_PENDING).fetch_all(&self.pool).await?;

        let mut actions = Vec::with_capacity(rows.len());
        for row in rows {
            if let Ok(action) = decode_row(&row)? {
                actions.push(action);
            }
        }
        Ok(actions)
    }

    /// Remove an action after it was synced or deliberately dropped
    pub async fn acknowledge(&self, entry_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed replay attempt; the action stays queued
    pub async fn record_failed_attempt(&self, entry_id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE offline_queue SET
                attempt_count = attempt_count + 1,
                last_attempt = ?,
                error_message = ?
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(error_message)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of queued actions
    pub async fn pending_count(&self) -> Result<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 as usize)
    }

    /// Whether a start for this local id is still waiting to be replayed
    pub async fn has_pending_start(&self, local_id: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM offline_queue WHERE action_kind = 'start' AND operation_ref = ?",
        )
        .bind(local_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }
}

/// Decode a queue row; the inner error carries the entry id of a bad payload
fn decode_row(
    row: &SqliteRow,
) -> Result<std::result::Result<PendingAction, (String, serde_json::Error)>> {
    let id: String = row.try_get("id")?;
    let data: String = row.try_get("data")?;

    let action = match serde_json::from_str::<QueuedAction>(&data) {
        Ok(action) => action,
        Err(error) => return Ok(Err((id, error))),
    };

    Ok(Ok(PendingAction {
        id,
        seq: row.try_get("seq")?,
        action,
        created_at: row.try_get("created_at")?,
        attempt_count: row.try_get("attempt_count")?,
        last_attempt: row.try_get("last_attempt")?,
        error_message: row.try_get("error_message")?,
    }))
}
