//! Error taxonomy for the engine
//!
//! Validation failures are never surfaced as `Err`: orchestrators turn them into
//! denial events. The types here classify those denials and cover the few
//! genuinely fallible calls (registry bookkeeping, world effects).

use serde::{Deserialize, Serialize};

use crate::types::{DeployableId, PlayerId, StoreId, VehicleId};

/// Coarse classification of every denial the engine can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request rejected by a rule (cooldown, eligibility, range, capacity)
    Validation,
    /// Target changed state between validation and commit
    ConcurrencyConflict,
    /// Referenced object does not exist (often a removal race)
    ResourceNotFound,
}

/// Registry bookkeeping errors, raised by lifecycle calls only
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Deployable {0} is already registered")]
    DuplicateDeployable(DeployableId),

    #[error("Ammo store {0} is already registered")]
    DuplicateStore(StoreId),

    #[error("Vehicle {0} is already tracked")]
    DuplicateVehicle(VehicleId),

    #[error("Player {0} has already joined")]
    DuplicatePlayer(PlayerId),

    #[error("Deployable {0} not found")]
    UnknownDeployable(DeployableId),

    #[error("Ammo store {0} not found")]
    UnknownStore(StoreId),

    #[error("Player {0} not found")]
    UnknownPlayer(PlayerId),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::UnknownDeployable(_)
            | RegistryError::UnknownStore(_)
            | RegistryError::UnknownPlayer(_) => ErrorKind::ResourceNotFound,
            _ => ErrorKind::Validation,
        }
    }
}

/// Failures reported by the game simulation when applying an effect
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("Player {0} is not present in the world")]
    PlayerNotInWorld(PlayerId),

    #[error("Teleport rejected: {0}")]
    TeleportRejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_are_classified() {
        assert_eq!(
            RegistryError::UnknownStore(StoreId::new()).kind(),
            ErrorKind::ResourceNotFound
        );
        assert_eq!(
            RegistryError::DuplicatePlayer(PlayerId(3)).kind(),
            ErrorKind::Validation
        );
    }
}
