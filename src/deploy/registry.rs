//! Deployable registry - every valid teleport target and its eligibility state

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::RegistryError;
use crate::events::DeployDenyReason;
use crate::types::{DeployableId, Position, TeamId, VehicleId};

/// Default enemy exclusion radius around rally points (meters)
pub const RALLY_EXCLUSION_RADIUS: f32 = 50.0;
/// Default enemy exclusion radius around forward operating bases (meters)
pub const FOB_EXCLUSION_RADIUS: f32 = 150.0;

/// Deployment target variants
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeployableKind {
    RallyPoint,
    ForwardOperatingBase,
    Vehicle {
        vehicle: VehicleId,
        stationary: bool,
        crew_locked: bool,
    },
    MainBase,
}

impl DeployableKind {
    pub fn label(&self) -> &'static str {
        match self {
            DeployableKind::RallyPoint => "rally_point",
            DeployableKind::ForwardOperatingBase => "fob",
            DeployableKind::Vehicle { .. } => "vehicle",
            DeployableKind::MainBase => "main_base",
        }
    }

    /// Variant-specific rule, evaluated after the shared checks
    fn check(&self) -> Result<(), DeployDenyReason> {
        match self {
            DeployableKind::Vehicle { stationary, .. } if !stationary => {
                Err(DeployDenyReason::VehicleMoving)
            }
            DeployableKind::Vehicle { crew_locked, .. } if *crew_locked => {
                Err(DeployDenyReason::VehicleLocked)
            }
            _ => Ok(()),
        }
    }
}

/// Structural/eligibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployableStatus {
    Active,
    Destroyed,
    Contested,
    /// Unavailable until the given instant, then Active again
    Cooldown { until: Instant },
}

/// A deployment target
#[derive(Debug, Clone)]
pub struct Deployable {
    pub id: DeployableId,
    pub kind: DeployableKind,
    pub position: Position,
    pub team: TeamId,
    pub status: DeployableStatus,
    pub exclusion_radius: Option<f32>,
    /// Set once the underlying object is gone; holders of the entry must treat it as dead
    removed: bool,
}

impl Deployable {
    pub fn new(kind: DeployableKind, team: TeamId, position: Position) -> Self {
        let exclusion_radius = match kind {
            DeployableKind::RallyPoint => Some(RALLY_EXCLUSION_RADIUS),
            DeployableKind::ForwardOperatingBase => Some(FOB_EXCLUSION_RADIUS),
            DeployableKind::Vehicle { .. } | DeployableKind::MainBase => None,
        };
        Self {
            id: DeployableId::new(),
            kind,
            position,
            team,
            status: DeployableStatus::Active,
            exclusion_radius,
            removed: false,
        }
    }

    pub fn rally_point(team: TeamId, position: Position) -> Self {
        Self::new(DeployableKind::RallyPoint, team, position)
    }

    pub fn fob(team: TeamId, position: Position) -> Self {
        Self::new(DeployableKind::ForwardOperatingBase, team, position)
    }

    /// Vehicles spawn parked and unlocked
    pub fn vehicle(vehicle: VehicleId, team: TeamId, position: Position) -> Self {
        Self::new(
            DeployableKind::Vehicle {
                vehicle,
                stationary: true,
                crew_locked: false,
            },
            team,
            position,
        )
    }

    pub fn main_base(team: TeamId, position: Position) -> Self {
        Self::new(DeployableKind::MainBase, team, position)
    }

    pub fn with_id(mut self, id: DeployableId) -> Self {
        self.id = id;
        self
    }

    pub fn with_exclusion_radius(mut self, radius: Option<f32>) -> Self {
        self.exclusion_radius = radius;
        self
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Status with lapsed cooldowns resolved
    pub fn effective_status(&self, now: Instant) -> DeployableStatus {
        match self.status {
            DeployableStatus::Cooldown { until } if now >= until => DeployableStatus::Active,
            status => status,
        }
    }

    /// Shared status/team checks followed by the variant rule.
    /// Enemy proximity needs the world and is checked by the orchestrator.
    pub fn check_structural(&self, team: TeamId, now: Instant) -> Result<(), DeployDenyReason> {
        if self.removed {
            return Err(DeployDenyReason::TargetNotFound);
        }
        match self.effective_status(now) {
            DeployableStatus::Active => {}
            DeployableStatus::Destroyed => return Err(DeployDenyReason::TargetDestroyed),
            DeployableStatus::Contested => return Err(DeployDenyReason::TargetContested),
            DeployableStatus::Cooldown { .. } => return Err(DeployDenyReason::TargetCoolingDown),
        }
        if self.team != team {
            return Err(DeployDenyReason::WrongTeam);
        }
        Ok(())
    }

    pub fn check_variant(&self) -> Result<(), DeployDenyReason> {
        self.kind.check()
    }
}

/// Read-only view for map/HUD collaborators
#[derive(Debug, Clone, Serialize)]
pub struct DeployableView {
    pub id: DeployableId,
    pub kind: &'static str,
    pub team: TeamId,
    pub position: Position,
    pub status: &'static str,
    /// Seconds until a cooling-down target becomes available
    pub available_in_secs: f32,
}

impl DeployableView {
    fn of(d: &Deployable, now: Instant) -> Self {
        let (status, available_in_secs) = match d.effective_status(now) {
            DeployableStatus::Active => ("active", 0.0),
            DeployableStatus::Destroyed => ("destroyed", 0.0),
            DeployableStatus::Contested => ("contested", 0.0),
            DeployableStatus::Cooldown { until } => {
                ("cooldown", until.saturating_duration_since(now).as_secs_f32())
            }
        };
        Self {
            id: d.id,
            kind: d.kind.label(),
            team: d.team,
            position: d.position,
            status,
            available_in_secs,
        }
    }
}

pub(crate) type DeployableEntry = Arc<Mutex<Deployable>>;

/// Registry of all deployment targets, one lock per entry
pub struct DeployableRegistry {
    entries: DashMap<DeployableId, DeployableEntry>,
}

impl DeployableRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, deployable: Deployable) -> Result<DeployableId, RegistryError> {
        let id = deployable.id;
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateDeployable(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(deployable)));
                Ok(id)
            }
        }
    }

    pub(crate) fn get(&self, id: &DeployableId) -> Option<DeployableEntry> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// Unlink an entry and poison it for anyone still holding it
    pub(crate) fn remove(&self, id: &DeployableId) -> Result<Deployable, RegistryError> {
        let (_, entry) = self
            .entries
            .remove(id)
            .ok_or(RegistryError::UnknownDeployable(*id))?;
        let mut deployable = entry.lock();
        deployable.removed = true;
        deployable.status = DeployableStatus::Destroyed;
        Ok(deployable.clone())
    }

    /// Apply a mutation under the entry lock
    pub(crate) fn update<R>(
        &self,
        id: &DeployableId,
        f: impl FnOnce(&mut Deployable) -> R,
    ) -> Result<R, RegistryError> {
        let entry = self.get(id).ok_or(RegistryError::UnknownDeployable(*id))?;
        let mut deployable = entry.lock();
        Ok(f(&mut deployable))
    }

    pub fn snapshot(&self, id: &DeployableId) -> Option<Deployable> {
        self.get(id).map(|e| e.lock().clone())
    }

    pub fn find_vehicle(&self, vehicle: VehicleId) -> Option<DeployableId> {
        self.entries.iter().find_map(|entry| match entry.value().lock().kind {
            DeployableKind::Vehicle { vehicle: v, .. } if v == vehicle => Some(*entry.key()),
            _ => None,
        })
    }

    /// All targets owned by `team`
    pub fn views_for_team(&self, team: TeamId, now: Instant) -> Vec<DeployableView> {
        let entries: Vec<DeployableEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries
            .iter()
            .filter_map(|entry| {
                let d = entry.lock();
                (d.team == team).then(|| DeployableView::of(&d, now))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DeployableRegistry {
    fn default() -> Self {
        Self::new()
    }
}
