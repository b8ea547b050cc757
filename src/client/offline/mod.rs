//! # Offline Support
//!
//! The pieces that keep the tracker usable without a backend.
//!
//! ## Key Components
//!
//! - `connectivity.rs`: Reachability probe consulted before every mutating action
//! - `reference_cache.rs`: Last-known activities, materials and equipment
//!
//! The durable action queue itself lives in [`crate::client::local_db`].

pub mod connectivity;
pub mod reference_cache;

pub use connectivity::{ConnectivityOracle, HttpProbe, StaticConnectivity};
pub use reference_cache::{ReferenceData, ReferenceDataCache};
