//! Shared verdict state
//!
//! Written only by the evaluation loop, read by the status server on every
//! request. Each verdict sits behind its own lock so a reader always gets a
//! matching flag/cause pair.

use parking_lot::RwLock;

use super::error::CheckError;

/// Latest health verdict
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthVerdict {
    pub healthy: bool,
    /// Cause of the last unhealthy verdict, empty when healthy
    pub last_error: String,
}

/// Latest master aggregator verdict
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleVerdict {
    pub is_master: bool,
    /// Error from the last role evaluation, empty when it ran cleanly
    pub last_error: String,
}

/// Process-wide verdict cell
///
/// Starts unhealthy and not-master until the first cycle lands.
#[derive(Debug, Default)]
pub struct HealthState {
    health: RwLock<HealthVerdict>,
    role: RwLock<RoleVerdict>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the health verdict
    pub fn health(&self) -> HealthVerdict {
        self.health.read().clone()
    }

    /// Snapshot of the role verdict
    pub fn role(&self) -> RoleVerdict {
        self.role.read().clone()
    }

    /// Store the outcome of a health evaluation
    ///
    /// Returns true if the healthy flag changed
    pub fn record_health(&self, result: &Result<(), CheckError>) -> bool {
        let next = HealthVerdict {
            healthy: result.is_ok(),
            last_error: result
                .as_ref()
                .err()
                .map(ToString::to_string)
                .unwrap_or_default(),
        };

        let mut current = self.health.write();
        let changed = current.healthy != next.healthy;
        *current = next;
        changed
    }

    /// Store the outcome of a role evaluation
    ///
    /// Returns true if the master flag changed
    pub fn record_role(&self, result: &Result<bool, CheckError>) -> bool {
        let next = match result {
            Ok(is_master) => RoleVerdict {
                is_master: *is_master,
                last_error: String::new(),
            },
            Err(e) => RoleVerdict {
                is_master: false,
                last_error: e.to_string(),
            },
        };

        let mut current = self.role.write();
        let changed = current.is_master != next.is_master;
        *current = next;
        changed
    }
}
