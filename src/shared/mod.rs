//! Shared Module
//!
//! Types shared by every part of the tracking core: the backend's wire
//! models, the error taxonomy and application configuration.
//!
//! # Overview
//!
//! Nothing in here performs I/O. The types are designed for serialization
//! to and from the REST backend and for persistence in the local database.

/// Backend wire models
pub mod models;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::{Result, TrackError};
pub use models::{
    Activity, ActivityType, Equipment, EquipmentCategory, Material, Operation, OperationDetails,
    OperationKey, Ref, StartOperationRequest, StopOperationRequest, User,
};
