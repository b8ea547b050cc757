//! MineTrack - Operation Tracking Core
//!
//! The offline-tolerant core of a mining-operations tracker. Operators pick a
//! piece of equipment and start or stop timed operations (loading, hauling,
//! waiting); the core keeps at most one operation running per session, keeps
//! working when the backend is unreachable and reconciles with the server of
//! record once it is reachable again.
//!
//! # Module Structure
//!
//! - **`shared`** - Platform-agnostic types
//!   - Domain models and wire types
//!   - Error taxonomy
//!   - Configuration
//!
//! - **`client`** - The tracking client
//!   - REST client with a bounded request timeout
//!   - SQLite durable queue and session store
//!   - Operation lifecycle, sync and history
//!
//! # Usage
//!
//! ```rust,no_run
//! use minetrack::client::{Config, MineTrack};
//! use minetrack::shared::OperationDetails;
//!
//! # async fn example() -> minetrack::shared::Result<()> {
//! let app = MineTrack::open(Config::new()).await?;
//! app.startup().await?;
//!
//! let data = app.reference_data().load(app.connectivity().as_ref()).await?;
//! if let (Some(equipment), Some(activity)) = (data.equipment.first(), data.activities.first()) {
//!     let details = OperationDetails {
//!         material: data.materials.first().map(|m| m.id.clone()),
//!         ..Default::default()
//!     };
//!     app.tracker().start(equipment, activity, &details).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Session state lives behind `Arc<RwLock<_>>`; every component holds a clone
//! of the same `SessionState` and mutates it only through lifecycle events.

/// Shared types and data structures
pub mod shared;

/// Tracking client: API, local database, lifecycle and sync
pub mod client;
