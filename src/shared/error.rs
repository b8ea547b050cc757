//! Shared Error Types
//!
//! This module defines the single error type used across the tracking core.
//! The variants follow the failure modes an operator action can run into,
//! from input validation up to a backend that never answers.
//!
//! # Error Categories
//!
//! - `Validation` - Missing or inconsistent input, rejected before any I/O
//! - `Conflict` / `Busy` / `NotActive` - Lifecycle preconditions that failed
//! - `Timeout` / `Network` / `Server` - Transient transport failures
//! - `ServerRejected` - The backend refused the request (4xx)
//! - `Storage` / `Serialization` / `Config` - Local infrastructure failures
//!
//! # Usage
//!
//! ```rust
//! use minetrack::shared::error::TrackError;
//!
//! let error = TrackError::validation("material", "A material is required for this activity");
//! assert!(!error.is_transient());
//! ```
use thiserror::Error;

use crate::shared::config::ConfigError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, TrackError>;

/// Errors produced by the operation tracking core
#[derive(Debug, Error)]
pub enum TrackError {
    /// Input validation error, never retried
    #[error("Validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// The request conflicts with the current active operation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A start or stop is already in flight for this session
    #[error("Another request is already in progress ({0})")]
    Busy(&'static str),

    /// Stop was requested but no operation is active
    #[error("Operation not active: {0}")]
    NotActive(String),

    /// The backend did not answer within the request timeout
    #[error("Request timeout - server is not responding (after {timeout_ms} ms)")]
    Timeout {
        /// Timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// Connection could not be established or was dropped
    #[error("Network error: {0}")]
    Network(String),

    /// The backend rejected the request (4xx)
    #[error("Server rejected request ({status}): {message}")]
    ServerRejected {
        /// HTTP status code
        status: u16,
        /// Message returned by the backend
        message: String,
    },

    /// The backend failed while handling the request (5xx)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Message returned by the backend
        message: String,
    },

    /// The backend answered with something we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No bearer token is available for an authenticated call
    #[error("Authentication required")]
    NotAuthenticated,

    /// Local database failure
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// JSON serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TrackError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a new not-active error
    pub fn not_active(message: impl Into<String>) -> Self {
        Self::NotActive(message.into())
    }

    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network(_) | Self::Server { .. }
        )
    }

    /// Whether the request was aborted by the client-side timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the backend refused the request itself
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::ServerRejected { .. })
    }

    /// Map an HTTP status and backend message onto the taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (400..500).contains(&status) {
            Self::ServerRejected { status, message }
        } else {
            Self::Server { status, message }
        }
    }
}
