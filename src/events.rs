//! Outcome events emitted to the Notification Bridge
//! These are the typed messages consumed by HUD, broadcast and statistics collaborators

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::types::{DeployableId, PlayerId, Position, StoreId, VehicleId};

/// Why a deploy request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployDenyReason {
    /// Player has not joined (or already left)
    PlayerNotFound,
    /// Another deploy for this player is still executing
    AlreadyInProgress,
    /// Player deployed too recently
    OnCooldown,
    /// Target id is not registered
    TargetNotFound,
    /// Target has been destroyed
    TargetDestroyed,
    /// Target is contested by the enemy
    TargetContested,
    /// Target is temporarily unavailable
    TargetCoolingDown,
    /// Target belongs to another team
    WrongTeam,
    /// Enemy presence inside the target's exclusion radius
    EnemyNearby,
    /// Vehicle target is moving
    VehicleMoving,
    /// Vehicle target is locked by its crew
    VehicleLocked,
    /// Target became invalid after validation
    TargetNoLongerValid,
    /// Player left while the deploy was in flight
    PlayerLeft,
    /// World refused to move the player
    TeleportFailed,
    /// Player is sending requests too quickly
    RateLimited,
}

impl DeployDenyReason {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlayerNotFound => "player_not_found",
            Self::AlreadyInProgress => "already_in_progress",
            Self::OnCooldown => "on_cooldown",
            Self::TargetNotFound => "target_not_found",
            Self::TargetDestroyed => "target_destroyed",
            Self::TargetContested => "target_contested",
            Self::TargetCoolingDown => "target_cooling_down",
            Self::WrongTeam => "wrong_team",
            Self::EnemyNearby => "enemy_nearby",
            Self::VehicleMoving => "vehicle_moving",
            Self::VehicleLocked => "vehicle_locked",
            Self::TargetNoLongerValid => "target_no_longer_valid",
            Self::PlayerLeft => "player_left",
            Self::TeleportFailed => "teleport_failed",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Human-readable cause for UI display
    pub fn cause(&self) -> &'static str {
        match self {
            Self::PlayerNotFound => "You are not registered for deployment",
            Self::AlreadyInProgress => "A deployment is already in progress",
            Self::OnCooldown => "You must wait before deploying again",
            Self::TargetNotFound => "That deployment point does not exist",
            Self::TargetDestroyed => "That deployment point has been destroyed",
            Self::TargetContested => "That deployment point is contested",
            Self::TargetCoolingDown => "That deployment point is not available yet",
            Self::WrongTeam => "That deployment point belongs to another team",
            Self::EnemyNearby => "Enemies are too close to that deployment point",
            Self::VehicleMoving => "That vehicle must be stationary",
            Self::VehicleLocked => "That vehicle is locked",
            Self::TargetNoLongerValid => "Target no longer valid",
            Self::PlayerLeft => "Deployment cancelled",
            Self::TeleportFailed => "Deployment failed",
            Self::RateLimited => "Too many requests",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PlayerNotFound | Self::TargetNotFound | Self::PlayerLeft => {
                ErrorKind::ResourceNotFound
            }
            Self::TargetNoLongerValid | Self::TeleportFailed => ErrorKind::ConcurrencyConflict,
            _ => ErrorKind::Validation,
        }
    }
}

/// Why a resupply transaction was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResupplyDenyReason {
    /// Player has not joined (or already left)
    PlayerNotFound,
    /// Store id is not registered
    StoreNotFound,
    /// Player drew from this store too recently
    OnCooldown,
    /// Store has nothing left to give
    Depleted,
    /// Store still holds ammo, but less than one unit of this kit costs
    InsufficientStock,
    /// Player is too far from the store
    OutOfRange,
    /// Store belongs to another team
    WrongTeam,
    /// Player's kit is already full
    KitFull,
    /// Player is sending requests too quickly
    RateLimited,
}

impl ResupplyDenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlayerNotFound => "player_not_found",
            Self::StoreNotFound => "store_not_found",
            Self::OnCooldown => "on_cooldown",
            Self::Depleted => "depleted",
            Self::InsufficientStock => "insufficient_stock",
            Self::OutOfRange => "out_of_range",
            Self::WrongTeam => "wrong_team",
            Self::KitFull => "kit_full",
            Self::RateLimited => "rate_limited",
        }
    }

    pub fn cause(&self) -> &'static str {
        match self {
            Self::PlayerNotFound => "You are not registered for resupply",
            Self::StoreNotFound => "That ammo source no longer exists",
            Self::OnCooldown => "You must wait before resupplying again",
            Self::Depleted => "That ammo source is empty",
            Self::InsufficientStock => "Not enough ammo left for your kit",
            Self::OutOfRange => "You are too far from the ammo source",
            Self::WrongTeam => "That ammo source belongs to another team",
            Self::KitFull => "Your kit is already full",
            Self::RateLimited => "Too many requests",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PlayerNotFound | Self::StoreNotFound => ErrorKind::ResourceNotFound,
            _ => ErrorKind::Validation,
        }
    }
}

/// Missile-warning state of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatPhase {
    Clear,
    Locked,
    Warning,
    FlareDeployed,
    /// Terminal; the vehicle is gone
    Destroyed,
}

/// Which seats a threat notification is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatRelevance {
    /// Driver/pilot only (early lock indication)
    Driver,
    /// Every occupied seat (inbound missile, clear, destroyed)
    AllCrew,
}

/// What caused a threat transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCause {
    LockAcquired,
    WarningThreshold,
    LockLost,
    MissileImpact,
    FlareDeployed,
    FlareExpired,
    VehicleDestroyed,
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Player was moved to a deployment target
    Deployed {
        player: PlayerId,
        target: DeployableId,
        position: Position,
    },

    /// Deploy request refused
    DeployDenied {
        player: PlayerId,
        target: DeployableId,
        reason: DeployDenyReason,
        kind: ErrorKind,
        cause: String,
    },

    /// Ammo granted from a store
    Resupplied {
        player: PlayerId,
        store: StoreId,
        amount: u32,
        requested: u32,
        /// Store ran short of what the kit could take
        partial: bool,
    },

    /// Resupply refused
    ResupplyDenied {
        player: PlayerId,
        store: StoreId,
        reason: ResupplyDenyReason,
        kind: ErrorKind,
        cause: String,
    },

    /// Store ran dry; replenish timer started
    StoreDepleted { store: StoreId },

    /// Store capacity was restored
    StoreReplenished { store: StoreId, remaining: u32 },

    /// Vehicle missile-warning state changed
    ThreatStateChanged {
        vehicle: VehicleId,
        from: ThreatPhase,
        to: ThreatPhase,
        cause: ThreatCause,
        seat: SeatRelevance,
        lock_source: Option<u64>,
        charges_remaining: u32,
    },
}

impl EngineEvent {
    pub fn deploy_denied(player: PlayerId, target: DeployableId, reason: DeployDenyReason) -> Self {
        EngineEvent::DeployDenied {
            player,
            target,
            reason,
            kind: reason.kind(),
            cause: reason.cause().to_string(),
        }
    }

    pub fn resupply_denied(player: PlayerId, store: StoreId, reason: ResupplyDenyReason) -> Self {
        EngineEvent::ResupplyDenied {
            player,
            store,
            reason,
            kind: reason.kind(),
            cause: reason.cause().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_serializes_with_machine_code() {
        let event = EngineEvent::deploy_denied(
            PlayerId(7),
            DeployableId::new(),
            DeployDenyReason::OnCooldown,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "deploy_denied");
        assert_eq!(json["reason"], DeployDenyReason::OnCooldown.code());
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["cause"], "You must wait before deploying again");

        let conflict = EngineEvent::deploy_denied(
            PlayerId(7),
            DeployableId::new(),
            DeployDenyReason::TargetNoLongerValid,
        );
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["reason"], "target_no_longer_valid");
        assert_eq!(json["kind"], "concurrency_conflict");

        let missing = EngineEvent::resupply_denied(
            PlayerId(7),
            StoreId::new(),
            ResupplyDenyReason::StoreNotFound,
        );
        assert_eq!(serde_json::to_value(&missing).unwrap()["kind"], "resource_not_found");
    }

    #[test]
    fn mid_flight_invalidation_is_a_conflict() {
        assert_eq!(
            DeployDenyReason::TargetNoLongerValid.kind(),
            ErrorKind::ConcurrencyConflict
        );
        assert_eq!(DeployDenyReason::TargetNotFound.kind(), ErrorKind::ResourceNotFound);
        assert_eq!(ResupplyDenyReason::Depleted.kind(), ErrorKind::Validation);
    }
}
