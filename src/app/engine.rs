//! Engine facade shared by the hosting game loop
//!
//! Wires the three cores to the same collaborators, applies per-player request
//! throttling, and fans lifecycle events out to every core that tracks them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::deploy::{Deployable, DeployOutcome, DeploymentOrchestrator};
use crate::error::{ErrorKind, RegistryError};
use crate::events::{DeployDenyReason, EngineEvent, ResupplyDenyReason};
use crate::notify::{SharedNotifier, SharedRecorder};
use crate::resupply::{KitRole, ResupplyOrchestrator, ResupplyOutcome};
use crate::threat::ThreatStateMachine;
use crate::types::{DeployableId, PlayerId, Position, StoreId, TeamId, VehicleId};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::SharedClock;
use crate::world::SharedWorld;

/// Housekeeping runs once per this many threat ticks
const PRUNE_EVERY_TICKS: u64 = 600;

/// Shared engine handle
#[derive(Clone)]
pub struct Engine {
    pub config: Arc<EngineConfig>,
    pub deployments: Arc<DeploymentOrchestrator>,
    pub resupply: Arc<ResupplyOrchestrator>,
    pub threats: Arc<ThreatStateMachine>,
    limiter: Arc<PlayerRateLimiter>,
    notifier: SharedNotifier,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        world: SharedWorld,
        notifier: SharedNotifier,
        recorder: SharedRecorder,
        clock: SharedClock,
    ) -> Self {
        let config = Arc::new(config);

        let deployments = Arc::new(DeploymentOrchestrator::new(
            &config,
            world.clone(),
            notifier.clone(),
            recorder.clone(),
            clock.clone(),
        ));
        let resupply = Arc::new(ResupplyOrchestrator::new(
            &config,
            world,
            notifier.clone(),
            recorder,
            clock.clone(),
        ));
        let threats = Arc::new(ThreatStateMachine::new(&config, notifier.clone(), clock));
        let limiter = Arc::new(PlayerRateLimiter::new(config.request_rate_per_sec));

        Self {
            config,
            deployments,
            resupply,
            threats,
            limiter,
            notifier,
        }
    }

    // ---- lifecycle ----

    pub fn player_joined(
        &self,
        player: PlayerId,
        team: TeamId,
        role: KitRole,
    ) -> Result<(), RegistryError> {
        self.deployments.player_joined(player, team)?;
        if let Err(e) = self.resupply.player_joined(player, team, role) {
            self.deployments.player_left(player);
            return Err(e);
        }
        info!(player = %player, team = %team, kit = ?role, "Player joined");
        Ok(())
    }

    pub fn player_left(&self, player: PlayerId) {
        let known = self.deployments.player_left(player) | self.resupply.player_left(player);
        if known {
            info!(player = %player, "Player left");
        }
    }

    /// Track a new vehicle for threats and offer it as a deployment target
    pub fn vehicle_spawned(
        &self,
        vehicle: VehicleId,
        team: TeamId,
        position: Position,
    ) -> Result<DeployableId, RegistryError> {
        self.threats.vehicle_spawned(vehicle)?;
        match self
            .deployments
            .register(Deployable::vehicle(vehicle, team, position))
        {
            Ok(id) => Ok(id),
            Err(e) => {
                self.threats.vehicle_despawned(vehicle);
                Err(e)
            }
        }
    }

    pub fn vehicle_destroyed(&self, vehicle: VehicleId) {
        self.threats.vehicle_destroyed(vehicle);
        self.drop_vehicle_target(vehicle);
    }

    pub fn vehicle_despawned(&self, vehicle: VehicleId) {
        self.threats.vehicle_despawned(vehicle);
        self.drop_vehicle_target(vehicle);
    }

    fn drop_vehicle_target(&self, vehicle: VehicleId) {
        let Some(target) = self.deployments.find_vehicle(vehicle) else {
            return;
        };
        match self.deployments.remove(target) {
            Ok(()) => {}
            // a concurrent removal already did the work
            Err(e) if e.kind() == ErrorKind::ResourceNotFound => {
                debug!(vehicle = %vehicle, target_id = %target, "Vehicle target already removed");
            }
            Err(e) => {
                warn!(
                    vehicle = %vehicle,
                    target_id = %target,
                    error = %e,
                    kind = ?e.kind(),
                    "Failed to drop vehicle target"
                );
            }
        }
    }

    // ---- player requests ----

    pub async fn request_deploy(&self, player: PlayerId, target: DeployableId) -> DeployOutcome {
        if !self.limiter.check(player) {
            debug!(player = %player, "Deploy request throttled");
            let reason = DeployDenyReason::RateLimited;
            self.notifier
                .emit(EngineEvent::deploy_denied(player, target, reason));
            return DeployOutcome::Denied(reason);
        }
        self.deployments.request_deploy(player, target).await
    }

    pub fn request_resupply(&self, player: PlayerId, store: StoreId, requested: u32) -> ResupplyOutcome {
        if !self.limiter.check(player) {
            debug!(player = %player, "Resupply request throttled");
            let reason = ResupplyDenyReason::RateLimited;
            self.notifier
                .emit(EngineEvent::resupply_denied(player, store, reason));
            return ResupplyOutcome::Denied(reason);
        }
        self.resupply.request_resupply(player, store, requested)
    }

    pub fn deploy_flare(&self, vehicle: VehicleId) -> bool {
        self.threats.deploy_flare(vehicle)
    }

    // ---- periodic driving ----

    /// Drive the threat state machine at the configured rate; never returns
    pub async fn run(&self) {
        let period = Duration::from_secs_f64(1.0 / self.config.threat_tick_hz.max(1) as f64);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        info!(hz = self.config.threat_tick_hz, "Threat tick loop started");

        loop {
            ticker.tick().await;
            ticks += 1;

            let fired = self.threats.tick();
            if fired > 0 {
                debug!(transitions = fired, "Threat tick");
            }

            if ticks % PRUNE_EVERY_TICKS == 0 {
                self.resupply.prune();
                self.limiter.prune();
            }
        }
    }
}
