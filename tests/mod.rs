//! Test suite for MineTrack
//!
//! This module organizes all tests

pub mod common;
pub mod property;
