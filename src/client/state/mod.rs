//! # Session State
//!
//! The application state for one operator session: authentication, the
//! selected equipment, the single operation slot and the session's
//! accumulated operating time.
//!
//! `AppState` is only mutated through [`SessionState`], which runs lifecycle
//! events through [`transition`](crate::client::operation::machine::transition)
//! and persists checkpoints. The tracker, synchronizer and auth manager all
//! receive a clone of the same handle.

use crate::client::local_db::{keys, LocalDatabase};
use crate::client::operation::machine::{
    transition, ActiveOperationState, Effect, OperationEvent, OperationPhase,
};
use crate::shared::models::{Equipment, User};
use crate::shared::Result;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Snapshot of the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub token: Option<String>,
    pub user: Option<User>,
    pub selected_equipment: Option<Equipment>,
    pub phase: OperationPhase,
    /// Seconds of finished operations in this session
    pub session_total_secs: u64,
}

impl AppState {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    pub fn active(&self) -> Option<&ActiveOperationState> {
        self.phase.active()
    }
}

/// Shared handle to the session state
#[derive(Debug, Clone)]
pub struct SessionState {
    inner: Arc<RwLock<AppState>>,
    db: LocalDatabase,
}

impl SessionState {
    pub fn new(db: LocalDatabase) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AppState::default())),
            db,
        }
    }

    pub async fn snapshot(&self) -> AppState {
        self.inner.read().await.clone()
    }

    pub async fn phase(&self) -> OperationPhase {
        self.inner.read().await.phase.clone()
    }

    pub async fn active(&self) -> Option<ActiveOperationState> {
        self.inner.read().await.active().cloned()
    }

    /// Apply a lifecycle event
    ///
    /// Local effects (checkpoint, session total) are carried out here; the
    /// effects that need the network or the queue are returned to the caller.
    /// A rejected event leaves the state untouched.
    pub async fn dispatch(&self, event: OperationEvent) -> Result<Vec<Effect>> {
        let effects = {
            let mut state = self.inner.write().await;
            let from = state.phase.name();
            let outcome = transition(&state.phase, event)?;
            if from != outcome.next.name() {
                tracing::info!("[TRACKER] {} -> {}", from, outcome.next.name());
            }
            state.phase = outcome.next;
            outcome.effects
        };

        let mut remaining = Vec::new();
        for effect in effects {
            match effect {
                Effect::Checkpoint(active) => self.checkpoint(active.as_ref()).await?,
                Effect::AccumulateElapsed { seconds } => self.accumulate(seconds).await?,
                other => remaining.push(other),
            }
        }
        Ok(remaining)
    }

    async fn checkpoint(&self, active: Option<&ActiveOperationState>) -> Result<()> {
        match active {
            Some(active) => self.db.put_json(keys::ACTIVE_OPERATION, active).await,
            None => self.db.remove(keys::ACTIVE_OPERATION).await,
        }
    }

    async fn accumulate(&self, seconds: u64) -> Result<()> {
        let total = {
            let mut state = self.inner.write().await;
            state.session_total_secs += seconds;
            state.session_total_secs
        };
        self.db.put_json(keys::SESSION_TOTAL, &total).await
    }

    /// Reload the checkpointed operation and the session total
    pub async fn restore(&self) -> Result<()> {
        let active: Option<ActiveOperationState> = self.db.get_json(keys::ACTIVE_OPERATION).await?;
        let total: Option<u64> = self.db.get_json(keys::SESSION_TOTAL).await?;

        let mut state = self.inner.write().await;
        state.session_total_secs = total.unwrap_or(0);
        if !state.phase.is_busy() {
            if let Some(active) = &active {
                tracing::info!(
                    "[TRACKER] Restored active operation {}",
                    active.operation_id().unwrap_or("<unknown>")
                );
            }
            state.phase = match active {
                Some(active) => OperationPhase::Active(active),
                None => OperationPhase::Idle,
            };
        }
        Ok(())
    }

    pub async fn set_auth(&self, token: String, user: User) {
        let mut state = self.inner.write().await;
        state.token = Some(token);
        state.user = Some(user);
    }

    /// Forget everything about the operator; the durable queue is untouched
    pub async fn clear(&self) -> Result<()> {
        *self.inner.write().await = AppState::default();
        self.db.remove(keys::ACTIVE_OPERATION).await?;
        self.db.remove(keys::SESSION_TOTAL).await
    }

    pub async fn select_equipment(&self, equipment: Option<Equipment>) {
        self.inner.write().await.selected_equipment = equipment;
    }

    pub async fn session_total_secs(&self) -> u64 {
        self.inner.read().await.session_total_secs
    }
}
