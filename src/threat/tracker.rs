//! Vehicle threat tracker - per-vehicle missile lock and countermeasure state

use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use serde::Serialize;

use crate::error::RegistryError;
use crate::events::{EngineEvent, SeatRelevance, ThreatCause, ThreatPhase};
use crate::types::VehicleId;

/// Threat state of one vehicle
#[derive(Debug, Clone)]
pub struct VehicleThreat {
    pub vehicle: VehicleId,
    pub phase: ThreatPhase,
    pub phase_since: Instant,
    pub lock_source: Option<u64>,
    pub charges: u32,
    pub max_charges: u32,
    pub last_flare: Option<Instant>,
}

impl VehicleThreat {
    pub fn new(vehicle: VehicleId, charges: u32, now: Instant) -> Self {
        Self {
            vehicle,
            phase: ThreatPhase::Clear,
            phase_since: now,
            lock_source: None,
            charges,
            max_charges: charges,
            last_flare: None,
        }
    }

    /// Move to `to` and describe the change; callers guarantee `to != phase`
    pub(crate) fn transition(&mut self, to: ThreatPhase, cause: ThreatCause, now: Instant) -> EngineEvent {
        let from = self.phase;
        self.phase = to;
        self.phase_since = now;
        if matches!(to, ThreatPhase::Clear | ThreatPhase::FlareDeployed) {
            self.lock_source = None;
        }
        EngineEvent::ThreatStateChanged {
            vehicle: self.vehicle,
            from,
            to,
            cause,
            seat: seat_relevance(from, to),
            lock_source: self.lock_source,
            charges_remaining: self.charges,
        }
    }
}

/// Early lock indication is for the driver only; anything involving an inbound
/// missile goes to every seat.
pub fn seat_relevance(from: ThreatPhase, to: ThreatPhase) -> SeatRelevance {
    match (from, to) {
        (ThreatPhase::Clear, ThreatPhase::Locked) | (ThreatPhase::Locked, ThreatPhase::Clear) => {
            SeatRelevance::Driver
        }
        _ => SeatRelevance::AllCrew,
    }
}

/// HUD view of a vehicle's threat state
#[derive(Debug, Clone, Serialize)]
pub struct ThreatView {
    pub vehicle: VehicleId,
    pub phase: ThreatPhase,
    pub lock_source: Option<u64>,
    pub charges: u32,
    pub max_charges: u32,
}

impl From<&VehicleThreat> for ThreatView {
    fn from(t: &VehicleThreat) -> Self {
        Self {
            vehicle: t.vehicle,
            phase: t.phase,
            lock_source: t.lock_source,
            charges: t.charges,
            max_charges: t.max_charges,
        }
    }
}

/// All tracked vehicles; each entry is only touched under its map guard
pub struct VehicleThreatTracker {
    vehicles: DashMap<VehicleId, VehicleThreat>,
}

impl VehicleThreatTracker {
    pub fn new() -> Self {
        Self {
            vehicles: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, threat: VehicleThreat) -> Result<(), RegistryError> {
        let id = threat.vehicle;
        match self.vehicles.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateVehicle(id)),
            Entry::Vacant(slot) => {
                slot.insert(threat);
                Ok(())
            }
        }
    }

    pub(crate) fn get_mut(&self, id: &VehicleId) -> Option<RefMut<'_, VehicleId, VehicleThreat>> {
        self.vehicles.get_mut(id)
    }

    pub(crate) fn remove(&self, id: &VehicleId) -> Option<VehicleThreat> {
        self.vehicles.remove(id).map(|(_, t)| t)
    }

    pub(crate) fn ids(&self) -> Vec<VehicleId> {
        self.vehicles.iter().map(|e| *e.key()).collect()
    }

    pub fn view(&self, id: &VehicleId) -> Option<ThreatView> {
        self.vehicles.get(id).map(|t| ThreatView::from(t.value()))
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

impl Default for VehicleThreatTracker {
    fn default() -> Self {
        Self::new()
    }
}
