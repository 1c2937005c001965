//! Deployment orchestrator - validates and executes teleports to deployables
//!
//! A request goes through three phases:
//! 1. reserve: the player's in-progress flag is test-and-set together with the cooldown check
//! 2. validate: the target is checked under its own lock
//! 3. commit: after the optional spawn delay the target is locked again, re-checked,
//!    and the teleport applied while the lock is held
//!
//! A target that stops being valid between 2 and 3 yields `TargetNoLongerValid`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::RegistryError;
use crate::events::{DeployDenyReason, EngineEvent};
use crate::notify::{SharedNotifier, SharedRecorder, StatRecord};
use crate::types::{DeployableId, PlayerId, Position, TeamId, VehicleId};
use crate::util::time::{has_elapsed, SharedClock};
use crate::world::SharedWorld;

use super::registry::{
    Deployable, DeployableKind, DeployableRegistry, DeployableStatus, DeployableView,
};

/// Result of a deploy request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeployOutcome {
    Deployed { position: Position },
    Denied(DeployDenyReason),
}

impl DeployOutcome {
    pub fn is_deployed(&self) -> bool {
        matches!(self, DeployOutcome::Deployed { .. })
    }

    pub fn denial(&self) -> Option<DeployDenyReason> {
        match self {
            DeployOutcome::Denied(reason) => Some(*reason),
            DeployOutcome::Deployed { .. } => None,
        }
    }
}

/// Per-player deployment bookkeeping
#[derive(Debug, Clone)]
pub struct PlayerDeploymentState {
    pub team: TeamId,
    pub last_deploy: Option<Instant>,
    pub in_progress: bool,
    /// Distinguishes a rejoin from the session that started an in-flight deploy
    session: u64,
}

/// Clears the in-progress flag when a deploy ends, however it ends
struct InFlight<'a> {
    players: &'a DashMap<PlayerId, PlayerDeploymentState>,
    player: PlayerId,
    session: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(mut state) = self.players.get_mut(&self.player) {
            if state.session == self.session {
                state.in_progress = false;
            }
        }
    }
}

pub struct DeploymentOrchestrator {
    registry: DeployableRegistry,
    players: DashMap<PlayerId, PlayerDeploymentState>,
    sessions: AtomicU64,
    world: SharedWorld,
    notifier: SharedNotifier,
    recorder: SharedRecorder,
    clock: SharedClock,
    rng: Mutex<ChaCha8Rng>,
    cooldown: Duration,
    delay: Duration,
    scatter_radius: f32,
}

impl DeploymentOrchestrator {
    pub fn new(
        config: &EngineConfig,
        world: SharedWorld,
        notifier: SharedNotifier,
        recorder: SharedRecorder,
        clock: SharedClock,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            registry: DeployableRegistry::new(),
            players: DashMap::new(),
            sessions: AtomicU64::new(1),
            world,
            notifier,
            recorder,
            clock,
            rng: Mutex::new(rng),
            cooldown: config.deploy_cooldown,
            delay: config.deploy_delay,
            scatter_radius: config.deploy_scatter_radius,
        }
    }

    // ---- player lifecycle ----

    pub fn player_joined(&self, player: PlayerId, team: TeamId) -> Result<(), RegistryError> {
        let session = self.sessions.fetch_add(1, Ordering::Relaxed);
        match self.players.entry(player) {
            Entry::Occupied(_) => Err(RegistryError::DuplicatePlayer(player)),
            Entry::Vacant(slot) => {
                slot.insert(PlayerDeploymentState {
                    team,
                    last_deploy: None,
                    in_progress: false,
                    session,
                });
                debug!(player = %player, team = %team, "Player registered for deployment");
                Ok(())
            }
        }
    }

    /// Any in-flight deploy of this player is cancelled at commit
    pub fn player_left(&self, player: PlayerId) -> bool {
        self.players.remove(&player).is_some()
    }

    pub fn player_state(&self, player: PlayerId) -> Option<PlayerDeploymentState> {
        self.players.get(&player).map(|s| s.clone())
    }

    // ---- deployable lifecycle (driven by world events) ----

    pub fn register(&self, deployable: Deployable) -> Result<DeployableId, RegistryError> {
        let kind = deployable.kind.label();
        let team = deployable.team;
        let id = self.registry.insert(deployable)?;
        info!(target_id = %id, kind, team = %team, "Deployable registered");
        Ok(id)
    }

    pub fn remove(&self, id: DeployableId) -> Result<(), RegistryError> {
        let removed = self.registry.remove(&id)?;
        info!(target_id = %id, kind = removed.kind.label(), "Deployable removed");
        Ok(())
    }

    pub fn set_status(&self, id: DeployableId, status: DeployableStatus) -> Result<(), RegistryError> {
        self.registry.update(&id, |d| d.status = status)?;
        debug!(target_id = %id, status = ?status, "Deployable status changed");
        Ok(())
    }

    /// Start a temporary unavailability window
    pub fn start_cooldown(&self, id: DeployableId, period: Duration) -> Result<(), RegistryError> {
        let until = self.clock.now() + period;
        self.set_status(id, DeployableStatus::Cooldown { until })
    }

    pub fn move_to(&self, id: DeployableId, position: Position) -> Result<(), RegistryError> {
        self.registry.update(&id, |d| d.position = position)
    }

    pub fn set_exclusion_radius(
        &self,
        id: DeployableId,
        radius: Option<f32>,
    ) -> Result<(), RegistryError> {
        self.registry.update(&id, |d| d.exclusion_radius = radius)
    }

    /// Update a vehicle target's motion; no-op for other variants
    pub fn set_vehicle_motion(
        &self,
        id: DeployableId,
        position: Position,
        is_stationary: bool,
    ) -> Result<(), RegistryError> {
        self.registry.update(&id, |d| {
            d.position = position;
            if let DeployableKind::Vehicle { stationary, .. } = &mut d.kind {
                *stationary = is_stationary;
            }
        })
    }

    pub fn set_vehicle_lock(&self, id: DeployableId, locked: bool) -> Result<(), RegistryError> {
        self.registry.update(&id, |d| {
            if let DeployableKind::Vehicle { crew_locked, .. } = &mut d.kind {
                *crew_locked = locked;
            }
        })
    }

    pub fn find_vehicle(&self, vehicle: VehicleId) -> Option<DeployableId> {
        self.registry.find_vehicle(vehicle)
    }

    pub fn deployable(&self, id: DeployableId) -> Option<Deployable> {
        self.registry.snapshot(&id)
    }

    pub fn deploy_map(&self, team: TeamId) -> Vec<DeployableView> {
        self.registry.views_for_team(team, self.clock.now())
    }

    // ---- requests ----

    /// Validate and execute a deploy request
    pub async fn request_deploy(&self, player: PlayerId, target: DeployableId) -> DeployOutcome {
        let (team, flight) = match self.reserve(player) {
            Ok(reserved) => reserved,
            Err(reason) => return self.deny(player, target, reason),
        };

        if let Err(reason) = self.validate(team, target) {
            drop(flight);
            return self.deny(player, target, reason);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = self.commit(player, team, target, flight.session);
        drop(flight);
        outcome
    }

    /// Preconditions (1) and (2); sets the in-progress flag on success
    fn reserve(&self, player: PlayerId) -> Result<(TeamId, InFlight<'_>), DeployDenyReason> {
        let now = self.clock.now();
        let mut state = self
            .players
            .get_mut(&player)
            .ok_or(DeployDenyReason::PlayerNotFound)?;

        if state.in_progress {
            return Err(DeployDenyReason::AlreadyInProgress);
        }
        if !has_elapsed(now, state.last_deploy, self.cooldown) {
            return Err(DeployDenyReason::OnCooldown);
        }

        state.in_progress = true;
        let reserved = (
            state.team,
            InFlight {
                players: &self.players,
                player,
                session: state.session,
            },
        );
        drop(state);
        Ok(reserved)
    }

    /// Preconditions (3) to (5)
    fn validate(&self, team: TeamId, target: DeployableId) -> Result<(), DeployDenyReason> {
        let entry = self
            .registry
            .get(&target)
            .ok_or(DeployDenyReason::TargetNotFound)?;
        let deployable = entry.lock();
        self.check_target(&deployable, team, self.clock.now())
    }

    fn check_target(
        &self,
        deployable: &Deployable,
        team: TeamId,
        now: Instant,
    ) -> Result<(), DeployDenyReason> {
        deployable.check_structural(team, now)?;
        if let Some(radius) = deployable.exclusion_radius {
            if self.world.enemies_within(team, deployable.position, radius) {
                return Err(DeployDenyReason::EnemyNearby);
            }
        }
        deployable.check_variant()
    }

    fn commit(
        &self,
        player: PlayerId,
        team: TeamId,
        target: DeployableId,
        session: u64,
    ) -> DeployOutcome {
        let Some(entry) = self.registry.get(&target) else {
            warn!(player = %player, target_id = %target, "Deploy target removed mid-flight");
            return self.deny(player, target, DeployDenyReason::TargetNoLongerValid);
        };
        let deployable = entry.lock();
        let now = self.clock.now();

        if let Err(reason) = self.check_target(&deployable, team, now) {
            warn!(
                player = %player,
                target_id = %target,
                reason = reason.code(),
                "Deploy target invalidated mid-flight"
            );
            return self.deny(player, target, DeployDenyReason::TargetNoLongerValid);
        }

        let still_here = self
            .players
            .get(&player)
            .is_some_and(|s| s.session == session && s.in_progress);
        if !still_here {
            return self.deny(player, target, DeployDenyReason::PlayerLeft);
        }

        let position = self.scatter(deployable.position);
        if let Err(e) = self.world.teleport(player, position) {
            warn!(player = %player, target_id = %target, error = %e, "Teleport failed");
            return self.deny(player, target, DeployDenyReason::TeleportFailed);
        }

        if let Some(mut state) = self.players.get_mut(&player) {
            if state.session == session {
                state.last_deploy = Some(now);
            }
        }

        self.notifier.emit(EngineEvent::Deployed {
            player,
            target,
            position,
        });
        drop(deployable);

        self.recorder.record(StatRecord::Deploy {
            player,
            target,
            at: Utc::now(),
        });
        info!(player = %player, target_id = %target, "Player deployed");
        DeployOutcome::Deployed { position }
    }

    /// Random point around the target so arrivals do not stack
    fn scatter(&self, origin: Position) -> Position {
        if !self.scatter_radius.is_finite() || self.scatter_radius <= 0.0 {
            return origin;
        }
        let mut rng = self.rng.lock();
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = rng.gen_range(0.0..=self.scatter_radius);
        origin.offset(angle, distance)
    }

    fn deny(&self, player: PlayerId, target: DeployableId, reason: DeployDenyReason) -> DeployOutcome {
        debug!(player = %player, target_id = %target, reason = reason.code(), "Deploy denied");
        self.notifier
            .emit(EngineEvent::deploy_denied(player, target, reason));
        DeployOutcome::Denied(reason)
    }
}
