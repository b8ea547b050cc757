//! # Operation Synchronizer
//!
//! Bridges local intent and the backend over an unreliable link.
//!
//! ## Features
//!
//! - **FIFO Replay**: Queued actions are replayed one at a time in append order
//! - **Id Rewriting**: Stops queued against a local id are sent with the server id
//!   recorded when their start synced
//! - **Poison Protection**: Actions the server rejects (4xx) are dropped and reported
//! - **Fail-Open Pull**: `sync_active_operations` never clears local state on a network error
//!
//! ## Failure policy
//!
//! A transient failure (timeout, connection error, 5xx) halts the pass: the
//! link is down and every later call would fail the same way. A rejection
//! drops the action; stops queued behind a rejected start are dropped with
//! it, while actions for other operations keep draining.
//!
//! ## Components
//!
//! - `background.rs`: Periodic flush loop driven by the connectivity oracle

pub mod background;

pub use background::{SyncService, SyncStatus};

use crate::client::api::RemoteOperationService;
use crate::client::local_db::{keys, ActionKind, LocalDatabase, PendingAction, QueuedAction};
use crate::client::operation::machine::{ActiveOperationState, OperationEvent};
use crate::client::operation::resolve_equipment;
use crate::client::state::SessionState;
use crate::shared::models::{
    is_local_id, StartOperationRequest, StopOperationRequest, LOCAL_ID_PREFIX,
};
use crate::shared::{Result, TrackError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Action handed to [`OperationSynchronizer::save_operation_locally`]
#[derive(Debug, Clone, PartialEq)]
pub enum LocalPayload {
    Start(StartOperationRequest),
    Stop {
        operation_id: String,
        request: StopOperationRequest,
        local_end_time: DateTime<Utc>,
    },
}

/// An action removed from the queue without reaching the server
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedAction {
    pub entry_id: String,
    pub kind: ActionKind,
    pub operation_ref: String,
    pub reason: String,
}

/// Summary of one drain pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// `(local id, server id)` for every start that synced
    pub started: Vec<(String, String)>,
    /// Server ids of operations stopped
    pub stopped: Vec<String>,
    pub dropped: Vec<DroppedAction>,
    /// Transient error that halted the pass
    pub halted_on: Option<String>,
    /// Actions still queued after the pass
    pub remaining: usize,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.started.len() + self.stopped.len()
    }

    /// Whether the queue drained without halting or dropping anything
    pub fn is_clean(&self) -> bool {
        self.halted_on.is_none() && self.dropped.is_empty() && self.remaining == 0
    }
}

/// What `sync_active_operations` did to the local slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveSyncOutcome {
    /// The server's active operation (by id) now fills the slot
    Adopted(String),
    /// The server has no active operation; the slot was cleared
    Cleared,
    /// Local state was left as is
    Unchanged,
}

enum Replay {
    Started { local_id: String, server_id: String },
    Stopped(String),
    Dropped(String),
    Halt(String),
}

pub struct OperationSynchronizer {
    db: LocalDatabase,
    remote: Arc<dyn RemoteOperationService>,
    session: SessionState,
    drain_lock: Mutex<()>,
}

impl OperationSynchronizer {
    pub fn new(
        db: LocalDatabase,
        remote: Arc<dyn RemoteOperationService>,
        session: SessionState,
    ) -> Self {
        Self {
            db,
            remote,
            session,
            drain_lock: Mutex::new(()),
        }
    }

    /// Queue an action for later replay
    ///
    /// Starts get a fresh local id (returned) that stands in for the server id
    /// until the start syncs.
    pub async fn save_operation_locally(&self, payload: LocalPayload) -> Result<Option<String>> {
        match payload {
            LocalPayload::Start(request) => {
                let local_id = format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4().simple());
                self.db
                    .append_action(&QueuedAction::Start {
                        local_id: local_id.clone(),
                        request,
                        queued_at: Utc::now(),
                    })
                    .await?;
                Ok(Some(local_id))
            }
            LocalPayload::Stop {
                operation_id,
                request,
                local_end_time,
            } => {
                self.db
                    .append_action(&QueuedAction::Stop {
                        operation_id,
                        request,
                        local_end_time,
                    })
                    .await?;
                Ok(None)
            }
        }
    }

    /// Replay the durable queue against the server
    ///
    /// Only one pass runs at a time; a second caller waits for the first to
    /// finish and then drains whatever is left. Appends are never blocked.
    pub async fn sync_to_server(&self) -> Result<SyncReport> {
        let _guard = self.drain_lock.lock().await;

        let pending = self.db.drain_in_order().await?;
        let mut report = SyncReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        tracing::info!("[SYNC] Replaying {} queued actions", pending.len());
        let mut rejected_starts: HashSet<String> = HashSet::new();

        for entry in pending {
            match self.replay(&entry, &rejected_starts).await? {
                Replay::Started {
                    local_id,
                    server_id,
                } => {
                    self.db.acknowledge(&entry.id).await?;
                    self.session
                        .dispatch(OperationEvent::AdoptServerId {
                            local_id: local_id.clone(),
                            server_id: server_id.clone(),
                        })
                        .await?;
                    report.started.push((local_id, server_id));
                }
                Replay::Stopped(server_id) => {
                    self.db.acknowledge(&entry.id).await?;
                    report.stopped.push(server_id);
                }
                Replay::Dropped(reason) => {
                    tracing::warn!(
                        "[SYNC] Dropping queued {} for {}: {}",
                        entry.action.kind(),
                        entry.action.operation_ref(),
                        reason
                    );
                    self.db.acknowledge(&entry.id).await?;
                    if let QueuedAction::Start { local_id, .. } = &entry.action {
                        rejected_starts.insert(local_id.clone());
                    }
                    report.dropped.push(DroppedAction {
                        entry_id: entry.id.clone(),
                        kind: entry.action.kind(),
                        operation_ref: entry.action.operation_ref().to_string(),
                        reason,
                    });
                }
                Replay::Halt(reason) => {
                    tracing::warn!("[SYNC] Halting replay: {}", reason);
                    self.db.record_failed_attempt(&entry.id, &reason).await?;
                    report.halted_on = Some(reason);
                    break;
                }
            }
        }

        report.remaining = self.db.pending_count().await?;
        self.db.prune_id_mappings().await?;
        if report.halted_on.is_none() {
            self.db.put_json(keys::LAST_SYNC_TIME, &Utc::now()).await?;
        }

        tracing::info!(
            "[SYNC] Pass finished: {} synced, {} dropped, {} remaining",
            report.synced(),
            report.dropped.len(),
            report.remaining
        );
        Ok(report)
    }

    async fn replay(
        &self,
        entry: &PendingAction,
        rejected_starts: &HashSet<String>,
    ) -> Result<Replay> {
        match &entry.action {
            QueuedAction::Start {
                local_id, request, ..
            } => match self.remote.start_operation(request).await {
                Ok(operation) => match operation.id {
                    Some(server_id) => {
                        self.db.record_id_mapping(local_id, &server_id).await?;
                        Ok(Replay::Started {
                            local_id: local_id.clone(),
                            server_id,
                        })
                    }
                    None => Ok(Replay::Dropped(
                        "server accepted the start without an id".to_string(),
                    )),
                },
                Err(e) => Ok(classify(e)),
            },
            QueuedAction::Stop {
                operation_id,
                request,
                ..
            } => {
                let target = if is_local_id(operation_id) {
                    if rejected_starts.contains(operation_id) {
                        return Ok(Replay::Dropped(
                            "its start was rejected by the server".to_string(),
                        ));
                    }
                    match self.db.resolve_id(operation_id).await? {
                        Some(server_id) => server_id,
                        None if self.db.has_pending_start(operation_id).await? => {
                            return Ok(Replay::Halt(format!(
                                "start for {} has not synced yet",
                                operation_id
                            )));
                        }
                        None => {
                            return Ok(Replay::Dropped(
                                "its start never reached the server".to_string(),
                            ))
                        }
                    }
                } else {
                    operation_id.clone()
                };

                match self.remote.stop_operation(&target, request).await {
                    Ok(_) => Ok(Replay::Stopped(target)),
                    Err(e) => Ok(classify(e)),
                }
            }
        }
    }

    /// Let the server's view of the active operation win
    ///
    /// A network failure leaves local state alone. So does a local-only
    /// operation whose start is still queued, since the server cannot know
    /// about it yet.
    pub async fn sync_active_operations(&self) -> Result<ActiveSyncOutcome> {
        let current = match self.remote.current_operation().await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!("[SYNC] Could not fetch current operation, keeping local state: {}", e);
                return Ok(ActiveSyncOutcome::Unchanged);
            }
        };

        let local = self.session.active().await;
        let (state, outcome) = match current.filter(|op| !op.is_stopped()) {
            Some(operation) => {
                let Some(id) = operation.id.clone() else {
                    tracing::warn!("[SYNC] Server reported an active operation without an id");
                    return Ok(ActiveSyncOutcome::Unchanged);
                };
                let equipment = resolve_equipment(&self.db, &operation.equipment).await?;
                let repeat_count = local
                    .as_ref()
                    .filter(|active| active.operation_id() == Some(id.as_str()))
                    .map_or(1, |active| active.repeat_count);
                let start_time = operation.start_time;
                let state = ActiveOperationState {
                    equipment,
                    operation,
                    start_time,
                    repeat_count,
                };
                (Some(state), ActiveSyncOutcome::Adopted(id))
            }
            None => {
                match &local {
                    None => return Ok(ActiveSyncOutcome::Unchanged),
                    Some(active) => {
                        if let Some(id) = active.operation_id().filter(|id| is_local_id(id)) {
                            if self.db.has_pending_start(id).await? {
                                tracing::info!(
                                    "[SYNC] Keeping queued operation {} the server has not seen",
                                    id
                                );
                                return Ok(ActiveSyncOutcome::Unchanged);
                            }
                        }
                    }
                }
                (None, ActiveSyncOutcome::Cleared)
            }
        };

        match self.session.dispatch(OperationEvent::Rehydrate(state)).await {
            Ok(_) => {
                tracing::info!("[SYNC] Active operation synced from server: {:?}", outcome);
                Ok(outcome)
            }
            Err(TrackError::Busy(phase)) => {
                tracing::debug!("[SYNC] Skipping server state while {}", phase);
                Ok(ActiveSyncOutcome::Unchanged)
            }
            Err(e) => Err(e),
        }
    }

    /// Flush the queue, then pull the server's current operation
    ///
    /// The pull is skipped while actions remain queued: the server's answer
    /// would not include them yet.
    pub async fn resume_session(&self) -> Result<(SyncReport, ActiveSyncOutcome)> {
        let report = self.sync_to_server().await?;
        if report.remaining > 0 {
            tracing::info!(
                "[SYNC] {} actions still queued, keeping local operation state",
                report.remaining
            );
            return Ok((report, ActiveSyncOutcome::Unchanged));
        }
        let outcome = self.sync_active_operations().await?;
        Ok((report, outcome))
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.db.pending_count().await
    }

    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.db.get_json(keys::LAST_SYNC_TIME).await
    }
}

fn classify(error: TrackError) -> Replay {
    if error.is_transient() {
        Replay::Halt(error.to_string())
    } else {
        Replay::Dropped(error.to_string())
    }
}
