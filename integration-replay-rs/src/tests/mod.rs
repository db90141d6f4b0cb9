//! Unit tests for the replay engine
//!
//! This module contains tests for the engine's components.

pub mod support;

pub mod diagnosis_tests;
pub mod execution_tests;
pub mod normalize_tests;
pub mod search_tests;
