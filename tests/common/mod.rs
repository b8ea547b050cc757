//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Backend stand-in built on wiremock
//! - Reference data and operation fixtures
//! - Custom assertion macros

pub mod mock_server;

// Re-export commonly used utilities
pub use fixtures::*;
pub use mock_server::*;
