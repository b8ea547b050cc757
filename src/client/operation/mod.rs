//! # Active Operation Tracking
//!
//! The single-slot operation lifecycle and the driver that runs it against
//! the network, the durable queue and the clock.
//!
//! ## Key Components
//!
//! - `machine.rs`: Pure transition function and form validation
//! - `tracker.rs`: Driver for start, stop and repeat
//! - `ticker.rs`: 1 Hz elapsed-time sampler for the display

pub mod machine;
pub mod ticker;
pub mod tracker;

pub use machine::{
    format_elapsed, validate_start, ActiveOperationState, Effect, OperationEvent, OperationPhase,
};
pub use ticker::{ElapsedSample, ElapsedTicker};
pub use tracker::{OperationTracker, RepeatOutcome, StopOutcome};

use crate::client::local_db::{keys, LocalDatabase};
use crate::shared::models::{Equipment, Ref};
use crate::shared::Result;

/// Full equipment record for a reference
///
/// Uses the populated document when the server sent one, then the cached
/// equipment list, then a placeholder carrying only the id.
pub async fn resolve_equipment(db: &LocalDatabase, reference: &Ref<Equipment>) -> Result<Equipment> {
    let id = match reference {
        Ref::Populated(equipment) => return Ok(equipment.clone()),
        Ref::Id(id) => id,
    };

    let cached: Vec<Equipment> = db
        .get_json(keys::CACHED_EQUIPMENT)
        .await?
        .unwrap_or_default();
    Ok(cached
        .into_iter()
        .find(|equipment| &equipment.id == id)
        .unwrap_or_else(|| Equipment::placeholder(id.clone())))
}
