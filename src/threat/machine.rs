//! Threat state machine
//!
//! ```text
//! Clear --lock--> Locked --threshold--> Warning --impact | lock lost--> Clear
//! Locked | Warning --flare--> FlareDeployed --window--> Clear
//! any --destroyed--> Destroyed (entry released)
//! ```
//!
//! Time-driven transitions are evaluated lazily: on every signal for a vehicle
//! and on the periodic `tick`. Each transition emits exactly one event.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::RegistryError;
use crate::events::{ThreatCause, ThreatPhase};
use crate::notify::SharedNotifier;
use crate::types::VehicleId;
use crate::util::time::{has_elapsed, SharedClock};

use super::tracker::{ThreatView, VehicleThreat, VehicleThreatTracker};

pub struct ThreatStateMachine {
    tracker: VehicleThreatTracker,
    notifier: SharedNotifier,
    clock: SharedClock,
    warning_after: Duration,
    flare_window: Duration,
    flare_cooldown: Duration,
    charges: u32,
}

impl ThreatStateMachine {
    pub fn new(config: &EngineConfig, notifier: SharedNotifier, clock: SharedClock) -> Self {
        Self {
            tracker: VehicleThreatTracker::new(),
            notifier,
            clock,
            warning_after: config.threat_warning,
            flare_window: config.flare_window,
            flare_cooldown: config.flare_cooldown,
            charges: config.flare_charges,
        }
    }

    // ---- vehicle lifecycle ----

    pub fn vehicle_spawned(&self, vehicle: VehicleId) -> Result<(), RegistryError> {
        self.tracker
            .insert(VehicleThreat::new(vehicle, self.charges, self.clock.now()))?;
        debug!(vehicle = %vehicle, charges = self.charges, "Vehicle tracked");
        Ok(())
    }

    /// Quiet removal (vehicle despawned intact)
    pub fn vehicle_despawned(&self, vehicle: VehicleId) -> bool {
        self.tracker.remove(&vehicle).is_some()
    }

    /// Terminal transition; the entry is released afterwards
    pub fn vehicle_destroyed(&self, vehicle: VehicleId) -> bool {
        let now = self.clock.now();
        {
            let Some(mut threat) = self.tracker.get_mut(&vehicle) else {
                return false;
            };
            let event = threat.transition(ThreatPhase::Destroyed, ThreatCause::VehicleDestroyed, now);
            self.notifier.emit(event);
        }
        self.tracker.remove(&vehicle);
        info!(vehicle = %vehicle, "Vehicle destroyed, threat tracking released");
        true
    }

    /// Restore all countermeasure charges
    pub fn rearm(&self, vehicle: VehicleId) -> bool {
        match self.tracker.get_mut(&vehicle) {
            Some(mut threat) => {
                threat.charges = threat.max_charges;
                true
            }
            None => false,
        }
    }

    pub fn view(&self, vehicle: VehicleId) -> Option<ThreatView> {
        self.tracker.view(&vehicle)
    }

    pub fn tracked(&self) -> usize {
        self.tracker.len()
    }

    // ---- simulation signals ----

    /// A launcher started tracking the vehicle
    pub fn lock_acquired(&self, vehicle: VehicleId, source: u64) -> bool {
        self.with_vehicle(vehicle, |threat, _| {
            if threat.phase != ThreatPhase::Clear {
                return None;
            }
            threat.lock_source = Some(source);
            Some((ThreatPhase::Locked, ThreatCause::LockAcquired))
        })
    }

    /// Explicit threshold signal from the simulation; the tick reaches the same state lazily
    pub fn warning_threshold_elapsed(&self, vehicle: VehicleId) -> bool {
        self.with_vehicle(vehicle, |threat, _| {
            (threat.phase == ThreatPhase::Locked)
                .then_some((ThreatPhase::Warning, ThreatCause::WarningThreshold))
        })
    }

    pub fn lock_lost(&self, vehicle: VehicleId) -> bool {
        self.with_vehicle(vehicle, |threat, _| {
            matches!(threat.phase, ThreatPhase::Locked | ThreatPhase::Warning)
                .then_some((ThreatPhase::Clear, ThreatCause::LockLost))
        })
    }

    /// Missile hit; damage itself is the simulation's business
    pub fn missile_impact(&self, vehicle: VehicleId) -> bool {
        self.with_vehicle(vehicle, |threat, _| {
            matches!(threat.phase, ThreatPhase::Locked | ThreatPhase::Warning)
                .then_some((ThreatPhase::Clear, ThreatCause::MissileImpact))
        })
    }

    /// Fire countermeasures; succeeds only from Locked or Warning with a charge
    /// available and the cooldown elapsed
    pub fn deploy_flare(&self, vehicle: VehicleId) -> bool {
        let flare_cooldown = self.flare_cooldown;
        let deployed = self.with_vehicle(vehicle, |threat, now| {
            let ready = matches!(threat.phase, ThreatPhase::Locked | ThreatPhase::Warning)
                && threat.charges > 0
                && has_elapsed(now, threat.last_flare, flare_cooldown);
            if !ready {
                return None;
            }
            threat.charges -= 1;
            threat.last_flare = Some(now);
            Some((ThreatPhase::FlareDeployed, ThreatCause::FlareDeployed))
        });
        if !deployed {
            debug!(vehicle = %vehicle, "Flare deployment refused");
        }
        deployed
    }

    /// Advance time-driven transitions for every vehicle; returns how many fired
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        self.tracker
            .ids()
            .into_iter()
            .filter_map(|id| self.tracker.get_mut(&id))
            .map(|mut threat| self.advance(&mut *threat, now))
            .sum()
    }

    /// Apply lapsed timers, then `signal`. True when `signal` caused a transition.
    fn with_vehicle(
        &self,
        vehicle: VehicleId,
        signal: impl FnOnce(&mut VehicleThreat, Instant) -> Option<(ThreatPhase, ThreatCause)>,
    ) -> bool {
        let now = self.clock.now();
        let Some(mut threat) = self.tracker.get_mut(&vehicle) else {
            return false;
        };
        self.advance(&mut *threat, now);
        match signal(&mut *threat, now) {
            Some((to, cause)) => {
                let event = threat.transition(to, cause, now);
                self.notifier.emit(event);
                true
            }
            None => false,
        }
    }

    fn advance(&self, threat: &mut VehicleThreat, now: Instant) -> usize {
        let due = match threat.phase {
            ThreatPhase::Locked if has_elapsed(now, Some(threat.phase_since), self.warning_after) => {
                Some((ThreatPhase::Warning, ThreatCause::WarningThreshold))
            }
            ThreatPhase::FlareDeployed
                if has_elapsed(now, Some(threat.phase_since), self.flare_window) =>
            {
                Some((ThreatPhase::Clear, ThreatCause::FlareExpired))
            }
            _ => None,
        };
        match due {
            Some((to, cause)) => {
                let event = threat.transition(to, cause, now);
                self.notifier.emit(event);
                1
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::events::{EngineEvent, SeatRelevance};
    use crate::notify::CapturingNotifier;
    use crate::util::time::ManualClock;

    struct Fixture {
        machine: ThreatStateMachine,
        notifier: Arc<CapturingNotifier>,
        clock: Arc<ManualClock>,
        vehicle: VehicleId,
    }

    fn fixture() -> Fixture {
        let notifier = Arc::new(CapturingNotifier::new());
        let clock = Arc::new(ManualClock::new());
        let config = EngineConfig {
            flare_charges: 2,
            ..EngineConfig::default()
        };
        let machine = ThreatStateMachine::new(&config, notifier.clone(), clock.clone());
        let vehicle = VehicleId::new();
        machine.vehicle_spawned(vehicle).unwrap();
        Fixture {
            machine,
            notifier,
            clock,
            vehicle,
        }
    }

    fn transitions(notifier: &CapturingNotifier) -> Vec<(ThreatPhase, ThreatPhase)> {
        notifier
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::ThreatStateChanged { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    fn phase(f: &Fixture) -> ThreatPhase {
        f.machine.view(f.vehicle).unwrap().phase
    }

    #[test]
    fn lock_then_threshold_emits_once_per_transition() {
        let f = fixture();
        assert!(f.machine.lock_acquired(f.vehicle, 11));
        f.clock.advance_secs(3.0);
        f.machine.warning_threshold_elapsed(f.vehicle);

        assert_eq!(phase(&f), ThreatPhase::Warning);
        assert_eq!(
            transitions(&f.notifier),
            vec![
                (ThreatPhase::Clear, ThreatPhase::Locked),
                (ThreatPhase::Locked, ThreatPhase::Warning)
            ]
        );

        // repeated signals do not repeat the event
        assert!(!f.machine.warning_threshold_elapsed(f.vehicle));
        assert!(!f.machine.lock_acquired(f.vehicle, 12));
        assert_eq!(transitions(&f.notifier).len(), 2);
    }

    #[test]
    fn explicit_threshold_signal_before_timer() {
        let f = fixture();
        f.machine.lock_acquired(f.vehicle, 11);
        assert!(f.machine.warning_threshold_elapsed(f.vehicle));
        assert_eq!(phase(&f), ThreatPhase::Warning);
    }

    #[test]
    fn tick_advances_lock_to_warning() {
        let f = fixture();
        f.machine.lock_acquired(f.vehicle, 11);
        f.clock.advance_secs(1.0);
        assert_eq!(f.machine.tick(), 0);
        f.clock.advance_secs(2.0);
        assert_eq!(f.machine.tick(), 1);
        assert_eq!(phase(&f), ThreatPhase::Warning);
        assert_eq!(f.machine.tick(), 0);
    }

    #[test]
    fn lock_events_carry_seat_relevance() {
        let f = fixture();
        f.machine.lock_acquired(f.vehicle, 11);
        f.machine.warning_threshold_elapsed(f.vehicle);
        let seats: Vec<SeatRelevance> = f
            .notifier
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::ThreatStateChanged { seat, .. } => Some(seat),
                _ => None,
            })
            .collect();
        assert_eq!(seats, vec![SeatRelevance::Driver, SeatRelevance::AllCrew]);
    }

    #[test]
    fn flare_consumes_one_charge_and_clears_after_window() {
        let f = fixture();
        f.machine.lock_acquired(f.vehicle, 11);
        f.machine.warning_threshold_elapsed(f.vehicle);

        assert!(f.machine.deploy_flare(f.vehicle));
        assert_eq!(phase(&f), ThreatPhase::FlareDeployed);
        assert_eq!(f.machine.view(f.vehicle).unwrap().charges, 1);

        // idempotent while flares are still burning
        assert!(!f.machine.deploy_flare(f.vehicle));
        assert!(!f.machine.deploy_flare(f.vehicle));
        assert_eq!(f.machine.view(f.vehicle).unwrap().charges, 1);

        f.clock.advance_secs(4.0);
        assert_eq!(f.machine.tick(), 1);
        assert_eq!(phase(&f), ThreatPhase::Clear);
    }

    #[test]
    fn flare_requires_threat_charges_and_cooldown() {
        let f = fixture();
        // nothing to spoof
        assert!(!f.machine.deploy_flare(f.vehicle));

        // early deployment from Locked is allowed
        f.machine.lock_acquired(f.vehicle, 11);
        assert!(f.machine.deploy_flare(f.vehicle));
        f.clock.advance_secs(4.0);
        f.machine.tick();

        // cooldown (8s) has not passed since the first flare
        f.machine.lock_acquired(f.vehicle, 12);
        assert!(!f.machine.deploy_flare(f.vehicle));
        f.clock.advance_secs(4.0);
        assert!(f.machine.deploy_flare(f.vehicle));
        assert_eq!(f.machine.view(f.vehicle).unwrap().charges, 0);

        f.clock.advance_secs(8.0);
        f.machine.tick();
        f.machine.lock_acquired(f.vehicle, 13);
        assert!(!f.machine.deploy_flare(f.vehicle), "no charges left");

        assert!(f.machine.rearm(f.vehicle));
        assert!(f.machine.deploy_flare(f.vehicle));
    }

    #[test]
    fn impact_and_lock_loss_return_to_clear() {
        let f = fixture();
        f.machine.lock_acquired(f.vehicle, 11);
        f.machine.warning_threshold_elapsed(f.vehicle);
        assert!(f.machine.missile_impact(f.vehicle));
        assert_eq!(phase(&f), ThreatPhase::Clear);

        f.machine.lock_acquired(f.vehicle, 12);
        assert!(f.machine.lock_lost(f.vehicle));
        assert_eq!(phase(&f), ThreatPhase::Clear);
        assert!(!f.machine.lock_lost(f.vehicle));
    }

    #[test]
    fn destruction_is_terminal_and_releases_entry() {
        let f = fixture();
        f.machine.lock_acquired(f.vehicle, 11);
        assert!(f.machine.vehicle_destroyed(f.vehicle));

        assert_eq!(
            transitions(&f.notifier).last(),
            Some(&(ThreatPhase::Locked, ThreatPhase::Destroyed))
        );
        assert!(f.machine.view(f.vehicle).is_none());
        assert!(!f.machine.deploy_flare(f.vehicle));
        assert!(!f.machine.vehicle_destroyed(f.vehicle));
        assert_eq!(f.machine.tracked(), 0);
    }

    #[test]
    fn lazy_flare_expiry_on_next_signal() {
        let f = fixture();
        f.machine.lock_acquired(f.vehicle, 11);
        f.machine.deploy_flare(f.vehicle);
        f.clock.advance_secs(10.0);

        // no tick ran; the new lock still sees the flare window as over
        assert!(f.machine.lock_acquired(f.vehicle, 12));
        assert_eq!(
            transitions(&f.notifier),
            vec![
                (ThreatPhase::Clear, ThreatPhase::Locked),
                (ThreatPhase::Locked, ThreatPhase::FlareDeployed),
                (ThreatPhase::FlareDeployed, ThreatPhase::Clear),
                (ThreatPhase::Clear, ThreatPhase::Locked),
            ]
        );
    }
}
