//! Aggregator health and role evaluation
//!
//! This module provides:
//! - The ordered diagnostic steps that decide whether the aggregator is healthy
//! - Master aggregator detection
//! - The shared verdict state read by the status server
//! - The background loop that keeps the verdicts fresh

mod checker;
pub(crate) mod error;
mod evaluator;
mod master;
mod queries;
mod state;

pub use checker::HealthChecker;
pub use state::HealthState;
