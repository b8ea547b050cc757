//! # Operation Tracker
//!
//! Drives the lifecycle for the operator: validates the form, asks the
//! connectivity oracle, then either talks to the backend or queues the
//! action locally and fabricates a placeholder operation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use minetrack::client::operation::OperationTracker;
//! use minetrack::shared::{Activity, Equipment, OperationDetails};
//!
//! # async fn example(tracker: OperationTracker, e1: Equipment, carga: Activity) -> minetrack::shared::Result<()> {
//! let details = OperationDetails {
//!     material: Some("m1".to_string()),
//!     ..Default::default()
//! };
//! let active = tracker.start(&e1, &carga, &details).await?;
//! println!("running {:?}", active.operation_id());
//!
//! tracker.stop(None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Timeouts
//!
//! The oracle is asked fresh before every action. When it says online but the
//! request then times out (or the connection drops), the action fails for the
//! caller and the next start or stop is queued locally without trusting the
//! oracle. A server rejection does not trigger that fallback.

use crate::client::api::RemoteOperationService;
use crate::client::local_db::LocalDatabase;
use crate::client::offline::ConnectivityOracle;
use crate::client::operation::machine::{
    validate_start, ActiveOperationState, Effect, OperationEvent,
};
use crate::client::operation::resolve_equipment;
use crate::client::state::SessionState;
use crate::client::sync::{LocalPayload, OperationSynchronizer};
use crate::shared::models::{
    is_local_id, Activity, Equipment, Operation, OperationDetails, StartOperationRequest,
    StopOperationRequest,
};
use crate::shared::{Result, TrackError};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a stop was carried out
///
/// Every variant carries the closed operation with its `end_time` set.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// The server closed the operation
    Stopped {
        operation_id: String,
        operation: Operation,
    },
    /// The stop waits in the durable queue
    Queued {
        operation_id: String,
        operation: Operation,
    },
    /// The server never saw the operation; it was only removed locally
    RemovedLocally {
        operation_id: String,
        operation: Operation,
    },
}

impl StopOutcome {
    pub fn operation_id(&self) -> &str {
        match self {
            Self::Stopped { operation_id, .. }
            | Self::Queued { operation_id, .. }
            | Self::RemovedLocally { operation_id, .. } => operation_id,
        }
    }

    pub fn operation(&self) -> &Operation {
        match self {
            Self::Stopped { operation, .. }
            | Self::Queued { operation, .. }
            | Self::RemovedLocally { operation, .. } => operation,
        }
    }
}

/// What `repeat_with_same_parameters` did
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatOutcome {
    /// The matching active operation's repeat count went up
    Incremented { repeat_count: u32 },
    /// A new operation was started with the reference's parameters
    Started(ActiveOperationState),
}

pub struct OperationTracker {
    session: SessionState,
    synchronizer: Arc<OperationSynchronizer>,
    remote: Arc<dyn RemoteOperationService>,
    connectivity: Arc<dyn ConnectivityOracle>,
    db: LocalDatabase,
    /// Set after a start/stop failed on the transport; the next one queues
    fallback_to_queue: AtomicBool,
}

impl OperationTracker {
    pub fn new(
        session: SessionState,
        synchronizer: Arc<OperationSynchronizer>,
        remote: Arc<dyn RemoteOperationService>,
        connectivity: Arc<dyn ConnectivityOracle>,
        db: LocalDatabase,
    ) -> Self {
        Self {
            session,
            synchronizer,
            remote,
            connectivity,
            db,
            fallback_to_queue: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn synchronizer(&self) -> &Arc<OperationSynchronizer> {
        &self.synchronizer
    }

    /// Start an operation on `equipment`
    pub async fn start(
        &self,
        equipment: &Equipment,
        activity: &Activity,
        details: &OperationDetails,
    ) -> Result<ActiveOperationState> {
        let request = validate_start(equipment, activity, details)?;
        self.start_with_request(equipment.clone(), request).await
    }

    async fn start_with_request(
        &self,
        equipment: Equipment,
        request: StartOperationRequest,
    ) -> Result<ActiveOperationState> {
        let effects = self
            .session
            .dispatch(OperationEvent::Start { equipment, request })
            .await?;

        for effect in effects {
            if let Effect::SubmitStart { request, .. } = effect {
                let confirmed = match self.submit_start(&request).await {
                    Ok(confirmed) => confirmed,
                    Err(e) => {
                        tracing::warn!("[TRACKER] Start failed: {}", e);
                        self.session.dispatch(OperationEvent::StartFailed).await?;
                        return Err(e);
                    }
                };
                self.session.dispatch(confirmed).await?;
            }
        }

        self.session
            .active()
            .await
            .ok_or_else(|| TrackError::not_active("the start did not produce an active operation"))
    }

    async fn submit_start(&self, request: &StartOperationRequest) -> Result<OperationEvent> {
        if self.should_queue().await {
            let local_id = self
                .synchronizer
                .save_operation_locally(LocalPayload::Start(request.clone()))
                .await?
                .ok_or_else(|| TrackError::InvalidResponse("queue returned no local id".into()))?;
            let now = Utc::now();
            tracing::info!("[TRACKER] Started {} offline", local_id);
            return Ok(OperationEvent::StartConfirmed {
                operation: Operation::local_placeholder(local_id, request, now),
                started_at: now,
            });
        }

        self.synchronizer.sync_to_server().await?;
        let operation = self
            .guarded(self.remote.start_operation(request).await)?;
        tracing::info!(
            "[TRACKER] Started {} on server",
            operation.id.as_deref().unwrap_or("<no id>")
        );
        let started_at = operation.start_time;
        Ok(OperationEvent::StartConfirmed {
            operation,
            started_at,
        })
    }

    /// Stop the active operation
    pub async fn stop(&self, distance: Option<f64>) -> Result<StopOutcome> {
        let effects = self
            .session
            .dispatch(OperationEvent::Stop {
                request: StopOperationRequest { distance },
            })
            .await?;

        let stopped_at = Utc::now();
        let mut outcome = None;
        for effect in effects {
            if let Effect::SubmitStop { operation, request } = effect {
                match self.submit_stop(&operation, request, stopped_at).await {
                    Ok(done) => outcome = Some(done),
                    Err(e) => {
                        tracing::warn!("[TRACKER] Stop failed: {}", e);
                        self.session.dispatch(OperationEvent::StopFailed).await?;
                        return Err(e);
                    }
                }
            }
        }

        let outcome = outcome
            .ok_or_else(|| TrackError::not_active("the stop was not submitted"))?;
        self.session
            .dispatch(OperationEvent::StopConfirmed {
                stopped_at: outcome.operation().end_time.unwrap_or(stopped_at),
            })
            .await?;
        Ok(outcome)
    }

    async fn submit_stop(
        &self,
        operation: &Operation,
        request: StopOperationRequest,
        stopped_at: DateTime<Utc>,
    ) -> Result<StopOutcome> {
        let operation_id = operation
            .id
            .clone()
            .ok_or_else(|| TrackError::not_active("the operation has no id"))?;
        let closed = operation.closed(stopped_at, request.distance);

        if self.should_queue().await {
            self.queue_stop(&operation_id, request, stopped_at).await?;
            return Ok(StopOutcome::Queued {
                operation_id,
                operation: closed,
            });
        }

        // A queued start may get its server id during this flush
        let flushed = self.synchronizer.sync_to_server().await?;
        let operation_id = if is_local_id(&operation_id) {
            let synced = flushed
                .started
                .iter()
                .find(|(local_id, _)| *local_id == operation_id)
                .map(|(_, server_id)| server_id.clone());
            match synced {
                Some(server_id) => server_id,
                None => self
                    .db
                    .resolve_id(&operation_id)
                    .await?
                    .unwrap_or(operation_id),
            }
        } else {
            operation_id
        };

        if is_local_id(&operation_id) {
            if self.db.has_pending_start(&operation_id).await? {
                self.queue_stop(&operation_id, request, stopped_at).await?;
                return Ok(StopOutcome::Queued {
                    operation_id,
                    operation: closed,
                });
            }
            tracing::info!("[TRACKER] {} never reached the server, removing locally", operation_id);
            return Ok(StopOutcome::RemovedLocally {
                operation_id,
                operation: closed,
            });
        }

        let echoed = self
            .guarded(self.remote.stop_operation(&operation_id, &request).await)?;
        tracing::info!("[TRACKER] Stopped {} on server", operation_id);

        // Prefer the server's record; a bare acknowledgement keeps the local close
        let operation = match echoed {
            Some(server) if server.is_stopped() => server,
            Some(server) => server.closed(stopped_at, request.distance),
            None => Operation {
                id: Some(operation_id.clone()),
                is_local: false,
                ..closed
            },
        };
        Ok(StopOutcome::Stopped {
            operation_id,
            operation,
        })
    }

    async fn queue_stop(
        &self,
        operation_id: &str,
        request: StopOperationRequest,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        self.synchronizer
            .save_operation_locally(LocalPayload::Stop {
                operation_id: operation_id.to_string(),
                request,
                local_end_time: stopped_at,
            })
            .await?;
        tracing::info!("[TRACKER] Stop for {} queued", operation_id);
        Ok(())
    }

    /// Log another occurrence of `reference`, or start it anew
    ///
    /// A running operation with the same equipment, activity and material only
    /// has its repeat count raised; nothing is sent to the server.
    pub async fn repeat_with_same_parameters(&self, reference: &Operation) -> Result<RepeatOutcome> {
        if let Some(active) = self.session.active().await {
            if active.key() == reference.key() {
                if let Some(id) = active.operation_id() {
                    let repeat_count = self.increment_repeat_count(id).await?.unwrap_or(active.repeat_count);
                    return Ok(RepeatOutcome::Incremented { repeat_count });
                }
            }
        }

        let equipment = resolve_equipment(&self.db, &reference.equipment).await?;
        let active = self
            .start_with_request(equipment, reference.to_start_request())
            .await?;
        Ok(RepeatOutcome::Started(active))
    }

    /// Raise the repeat count of the active operation if its id matches
    ///
    /// Returns the new count, or `None` when nothing matched.
    pub async fn increment_repeat_count(&self, operation_id: &str) -> Result<Option<u32>> {
        self.session
            .dispatch(OperationEvent::IncrementRepeat {
                operation_id: operation_id.to_string(),
            })
            .await?;

        Ok(self
            .session
            .active()
            .await
            .filter(|active| active.operation_id() == Some(operation_id))
            .map(|active| active.repeat_count))
    }

    /// Reload the checkpointed operation after a restart
    pub async fn restore_session(&self) -> Result<Option<ActiveOperationState>> {
        self.session.restore().await?;
        Ok(self.session.active().await)
    }

    /// Whether the next submission goes to the queue
    async fn should_queue(&self) -> bool {
        if self.fallback_to_queue.swap(false, Ordering::SeqCst) {
            tracing::info!("[TRACKER] Previous request failed on the transport, queuing locally");
            return true;
        }
        !self.connectivity.is_online().await
    }

    /// Arm the queue fallback when the transport failed
    fn guarded<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if matches!(e, TrackError::Timeout { .. } | TrackError::Network(_)) {
                self.fallback_to_queue.store(true, Ordering::SeqCst);
            }
        }
        result
    }
}
