//! # Operation Lifecycle
//!
//! Pure transition function for the single active-operation slot:
//!
//! ```text
//! Idle --Start--> Starting --StartConfirmed--> Active --Stop--> Stopping --StopConfirmed--> Idle
//!                    |                                             |
//!                    +--StartFailed--> Idle        Active <--StopFailed--+
//! ```
//!
//! [`transition`] never performs I/O. It returns the next phase plus the
//! effects an outer driver has to carry out (network calls, queue writes,
//! checkpoints). Because the phase holds at most one
//! [`ActiveOperationState`], a second active operation cannot be
//! represented at all.

use crate::shared::models::{
    Activity, Equipment, EquipmentCategory, Operation, OperationDetails, OperationKey,
    StartOperationRequest, StopOperationRequest,
};
use crate::shared::{Result, TrackError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The operation currently running in this session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOperationState {
    pub equipment: Equipment,
    pub operation: Operation,
    /// Wall-clock start used for the elapsed-time display
    pub start_time: DateTime<Utc>,
    /// Occurrences logged for this operation without restarting it
    pub repeat_count: u32,
}

impl ActiveOperationState {
    pub fn new(equipment: Equipment, operation: Operation, start_time: DateTime<Utc>) -> Self {
        Self {
            equipment,
            operation,
            start_time,
            repeat_count: 1,
        }
    }

    pub fn operation_id(&self) -> Option<&str> {
        self.operation.id.as_deref()
    }

    pub fn key(&self) -> OperationKey {
        self.operation.key()
    }

    /// Elapsed time at `now`, never negative
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.start_time).max(chrono::Duration::zero())
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        self.elapsed(now).num_seconds().max(0) as u64
    }
}

/// Format seconds as `HH:MM:SS`
pub fn format_elapsed(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Where the session's single operation slot stands
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OperationPhase {
    #[default]
    Idle,
    /// Start request in flight or being queued
    Starting {
        equipment: Equipment,
        request: StartOperationRequest,
    },
    Active(ActiveOperationState),
    /// Stop request in flight or being queued
    Stopping { active: ActiveOperationState },
}

impl OperationPhase {
    pub fn name(&self) -> &'static str {
        match self {
            OperationPhase::Idle => "idle",
            OperationPhase::Starting { .. } => "starting",
            OperationPhase::Active(_) => "active",
            OperationPhase::Stopping { .. } => "stopping",
        }
    }

    /// The running operation, including one that is being stopped
    pub fn active(&self) -> Option<&ActiveOperationState> {
        match self {
            OperationPhase::Active(active) | OperationPhase::Stopping { active } => Some(active),
            _ => None,
        }
    }

    /// Whether a start or stop is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            OperationPhase::Starting { .. } | OperationPhase::Stopping { .. }
        )
    }
}

/// Inputs to the lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum OperationEvent {
    /// Operator asked to start an operation (already validated)
    Start {
        equipment: Equipment,
        request: StartOperationRequest,
    },
    /// The server, or the local queue, accepted the start
    StartConfirmed {
        operation: Operation,
        started_at: DateTime<Utc>,
    },
    StartFailed,
    Stop { request: StopOperationRequest },
    StopConfirmed { stopped_at: DateTime<Utc> },
    StopFailed,
    /// Log one more occurrence of the running operation
    IncrementRepeat { operation_id: String },
    /// A queued start synced and the server assigned an id
    AdoptServerId { local_id: String, server_id: String },
    /// Replace the slot with the server's view (or a restored checkpoint)
    Rehydrate(Option<ActiveOperationState>),
}

/// Work the driver has to perform after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send the start to the server or queue it
    SubmitStart {
        equipment: Equipment,
        request: StartOperationRequest,
    },
    /// Send the stop to the server or queue it
    SubmitStop {
        operation: Operation,
        request: StopOperationRequest,
    },
    /// Add a finished operation's duration to the session total
    AccumulateElapsed { seconds: u64 },
    /// Persist the slot so it survives a restart
    Checkpoint(Option<ActiveOperationState>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: OperationPhase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: OperationPhase) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Compute the next phase for `event`
///
/// Rejected events leave the phase untouched; the caller keeps `phase`.
pub fn transition(phase: &OperationPhase, event: OperationEvent) -> Result<Transition> {
    use OperationEvent as E;
    use OperationPhase as P;

    match (phase, event) {
        (P::Idle, E::Start { equipment, request }) => Ok(Transition::to(P::Starting {
            equipment: equipment.clone(),
            request: request.clone(),
        })
        .with(Effect::SubmitStart { equipment, request })),
        (P::Active(active), E::Start { equipment, .. }) => {
            if active.equipment.id != equipment.id {
                Err(TrackError::conflict(format!(
                    "An operation is already running on {}; stop it before switching equipment",
                    active.equipment.name
                )))
            } else {
                Err(TrackError::conflict(
                    "An operation is already running on this equipment; stop it first",
                ))
            }
        }
        (P::Starting { .. } | P::Stopping { .. }, E::Start { .. }) => {
            Err(TrackError::Busy(phase.name()))
        }

        (P::Starting { equipment, .. }, E::StartConfirmed { operation, started_at }) => {
            let active = ActiveOperationState::new(equipment.clone(), operation, started_at);
            Ok(Transition::to(P::Active(active.clone())).with(Effect::Checkpoint(Some(active))))
        }
        (P::Starting { .. }, E::StartFailed) => Ok(Transition::to(P::Idle)),
        (_, E::StartConfirmed { .. } | E::StartFailed) => Err(TrackError::InvalidResponse(
            format!("No start in flight (phase {})", phase.name()),
        )),

        (P::Active(active), E::Stop { request }) => {
            if active.operation.is_stopped() {
                return Err(TrackError::not_active("the operation has already been stopped"));
            }
            Ok(Transition::to(P::Stopping {
                active: active.clone(),
            })
            .with(Effect::SubmitStop {
                operation: active.operation.clone(),
                request,
            }))
        }
        (P::Idle, E::Stop { .. }) => Err(TrackError::not_active("no operation is running")),
        (P::Starting { .. } | P::Stopping { .. }, E::Stop { .. }) => {
            Err(TrackError::Busy(phase.name()))
        }

        (P::Stopping { active }, E::StopConfirmed { stopped_at }) => Ok(Transition::to(P::Idle)
            .with(Effect::AccumulateElapsed {
                seconds: active.elapsed_secs(stopped_at),
            })
            .with(Effect::Checkpoint(None))),
        (P::Stopping { active }, E::StopFailed) => Ok(Transition::to(P::Active(active.clone()))),
        (_, E::StopConfirmed { .. } | E::StopFailed) => Err(TrackError::InvalidResponse(
            format!("No stop in flight (phase {})", phase.name()),
        )),

        (P::Active(active), E::IncrementRepeat { operation_id }) => {
            if active.operation_id() != Some(operation_id.as_str()) {
                return Ok(Transition::to(phase.clone()));
            }
            let mut active = active.clone();
            active.repeat_count += 1;
            Ok(Transition::to(P::Active(active.clone())).with(Effect::Checkpoint(Some(active))))
        }
        (_, E::IncrementRepeat { .. }) => Ok(Transition::to(phase.clone())),

        (P::Active(active), E::AdoptServerId { local_id, server_id })
            if active.operation_id() == Some(local_id.as_str()) =>
        {
            let active = adopt(active, server_id);
            Ok(Transition::to(P::Active(active.clone())).with(Effect::Checkpoint(Some(active))))
        }
        (P::Stopping { active }, E::AdoptServerId { local_id, server_id })
            if active.operation_id() == Some(local_id.as_str()) =>
        {
            let active = adopt(active, server_id);
            Ok(Transition::to(P::Stopping {
                active: active.clone(),
            })
            .with(Effect::Checkpoint(Some(active))))
        }
        (_, E::AdoptServerId { .. }) => Ok(Transition::to(phase.clone())),

        (P::Idle | P::Active(_), E::Rehydrate(state)) => {
            let next = match &state {
                Some(active) => P::Active(active.clone()),
                None => P::Idle,
            };
            Ok(Transition::to(next).with(Effect::Checkpoint(state)))
        }
        (P::Starting { .. } | P::Stopping { .. }, E::Rehydrate(_)) => {
            Err(TrackError::Busy(phase.name()))
        }
    }
}

fn adopt(active: &ActiveOperationState, server_id: String) -> ActiveOperationState {
    let mut active = active.clone();
    active.operation.id = Some(server_id);
    active.operation.is_local = false;
    active
}

/// Check the operation form and build the start request
///
/// The activity has to apply to the equipment's category. Loading and
/// transport activities need a material, and activities with a reason
/// taxonomy need one of their reasons. The free-text detail sent to the
/// server is the picked reason, or the trimmed notes when no reason applies.
pub fn validate_start(
    equipment: &Equipment,
    activity: &Activity,
    details: &OperationDetails,
) -> Result<StartOperationRequest> {
    if !activity.applies_to(equipment.category) {
        return Err(TrackError::validation(
            "activity",
            format!(
                "'{}' is not available for {} equipment",
                activity.name,
                category_name(equipment.category)
            ),
        ));
    }

    let material = non_empty(details.material.as_deref());
    if activity.requires_material() && material.is_none() {
        return Err(TrackError::validation(
            "material",
            "A material is required for this activity",
        ));
    }

    let truck = non_empty(details.truck_being_loaded.as_deref());
    if truck.is_some() && equipment.category != EquipmentCategory::Loading {
        return Err(TrackError::validation(
            "truckBeingLoaded",
            "Only loading equipment can load a truck",
        ));
    }

    let reason = non_empty(details.detail_reason.as_deref());
    if let Some(taxonomy) = activity.activity_details.as_ref().filter(|d| !d.is_empty()) {
        match reason {
            None => {
                return Err(TrackError::validation(
                    "activityDetails",
                    format!("Select a reason for '{}'", activity.name),
                ))
            }
            Some(reason) if !taxonomy.all_reasons().any(|r| r == reason) => {
                return Err(TrackError::validation(
                    "activityDetails",
                    format!("'{}' is not a reason offered for '{}'", reason, activity.name),
                ))
            }
            Some(_) => {}
        }
    }

    let activity_details = reason
        .or_else(|| non_empty(details.notes.as_deref()))
        .map(str::to_string);

    Ok(StartOperationRequest {
        equipment: equipment.id.clone(),
        activity: activity.id.clone(),
        material: material.map(str::to_string),
        truck_being_loaded: truck.map(str::to_string),
        mining_front: non_empty(details.mining_front.as_deref()).map(str::to_string),
        destination: non_empty(details.destination.as_deref()).map(str::to_string),
        activity_details,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn category_name(category: EquipmentCategory) -> &'static str {
    match category {
        EquipmentCategory::Loading => "loading",
        EquipmentCategory::Transport => "transport",
    }
}
