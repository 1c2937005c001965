//! Resupply orchestrator - ammo transactions against limited stores
//!
//! Every transaction runs entirely under the store's lock, with the player's
//! kit locked inside it, so the store decrement and the kit grant are one step.
//! Lock order is always store, then kit.

use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::RegistryError;
use crate::events::{EngineEvent, ResupplyDenyReason};
use crate::notify::{SharedNotifier, SharedRecorder, StatRecord};
use crate::types::{PlayerId, StoreId, TeamId};
use crate::util::time::SharedClock;
use crate::world::SharedWorld;

use super::kit::{KitRole, PlayerKit};
use super::registry::{AmmoStore, AmmoStoreRegistry, StoreView};

/// Result of a resupply request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResupplyOutcome {
    Resupplied {
        amount: u32,
        partial: bool,
        store_remaining: u32,
    },
    Denied(ResupplyDenyReason),
}

impl ResupplyOutcome {
    pub fn granted(&self) -> u32 {
        match self {
            ResupplyOutcome::Resupplied { amount, .. } => *amount,
            ResupplyOutcome::Denied(_) => 0,
        }
    }

    pub fn denial(&self) -> Option<ResupplyDenyReason> {
        match self {
            ResupplyOutcome::Denied(reason) => Some(*reason),
            ResupplyOutcome::Resupplied { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Loadout {
    team: TeamId,
    kit: PlayerKit,
}

pub struct ResupplyOrchestrator {
    stores: AmmoStoreRegistry,
    loadouts: DashMap<PlayerId, Loadout>,
    world: SharedWorld,
    notifier: SharedNotifier,
    recorder: SharedRecorder,
    clock: SharedClock,
    cooldown: Duration,
    range: f32,
    default_replenish: Duration,
}

impl ResupplyOrchestrator {
    pub fn new(
        config: &EngineConfig,
        world: SharedWorld,
        notifier: SharedNotifier,
        recorder: SharedRecorder,
        clock: SharedClock,
    ) -> Self {
        Self {
            stores: AmmoStoreRegistry::new(),
            loadouts: DashMap::new(),
            world,
            notifier,
            recorder,
            clock,
            cooldown: config.resupply_cooldown,
            range: config.resupply_range,
            default_replenish: config.store_replenish,
        }
    }

    // ---- player lifecycle ----

    pub fn player_joined(
        &self,
        player: PlayerId,
        team: TeamId,
        role: KitRole,
    ) -> Result<(), RegistryError> {
        match self.loadouts.entry(player) {
            Entry::Occupied(_) => Err(RegistryError::DuplicatePlayer(player)),
            Entry::Vacant(slot) => {
                slot.insert(Loadout {
                    team,
                    kit: PlayerKit::full(role),
                });
                Ok(())
            }
        }
    }

    pub fn player_left(&self, player: PlayerId) -> bool {
        self.loadouts.remove(&player).is_some()
    }

    /// Respawn or kit change
    pub fn set_kit(&self, player: PlayerId, kit: PlayerKit) -> Result<(), RegistryError> {
        let mut loadout = self
            .loadouts
            .get_mut(&player)
            .ok_or(RegistryError::UnknownPlayer(player))?;
        loadout.kit = kit;
        Ok(())
    }

    /// Game simulation reports rounds fired
    pub fn ammo_spent(&self, player: PlayerId, units: u32) -> Result<(), RegistryError> {
        let mut loadout = self
            .loadouts
            .get_mut(&player)
            .ok_or(RegistryError::UnknownPlayer(player))?;
        loadout.kit.spend(units);
        Ok(())
    }

    pub fn kit(&self, player: PlayerId) -> Option<PlayerKit> {
        self.loadouts.get(&player).map(|l| l.kit)
    }

    // ---- store lifecycle ----

    /// Stores placed without an explicit replenish period use the configured one
    pub fn register(&self, mut store: AmmoStore) -> Result<StoreId, RegistryError> {
        if store.replenish_after.is_none() {
            store.replenish_after = Some(self.default_replenish);
        }
        let capacity = store.capacity;
        let id = self.stores.insert(store)?;
        info!(store = %id, capacity, "Ammo store registered");
        Ok(id)
    }

    pub fn remove(&self, id: StoreId) -> Result<(), RegistryError> {
        let removed = self.stores.remove(&id)?;
        info!(store = %id, remaining = removed.remaining, "Ammo store removed");
        Ok(())
    }

    /// External refill (logistics delivery); capped at capacity
    pub fn replenish(&self, id: StoreId, units: u32) -> Result<u32, RegistryError> {
        let entry = self.stores.get(&id).ok_or(RegistryError::UnknownStore(id))?;
        let mut store = entry.lock();
        store.add(units);
        let remaining = store.remaining;
        self.notifier
            .emit(EngineEvent::StoreReplenished { store: id, remaining });
        debug!(store = %id, remaining, "Ammo store replenished");
        Ok(remaining)
    }

    pub fn store(&self, id: StoreId) -> Option<StoreView> {
        self.stores.view(&id)
    }

    /// Drop expired per-player cooldown bookkeeping
    pub fn prune(&self) {
        let now = self.clock.now();
        for entry in self.stores.all() {
            entry.lock().prune_cooldowns(now, self.cooldown);
        }
    }

    // ---- requests ----

    /// Draw up to `requested` kit units from a store
    pub fn request_resupply(
        &self,
        player: PlayerId,
        store_id: StoreId,
        requested: u32,
    ) -> ResupplyOutcome {
        let Some(entry) = self.stores.get(&store_id) else {
            if !self.loadouts.contains_key(&player) {
                return self.deny(player, store_id, ResupplyDenyReason::PlayerNotFound);
            }
            return self.deny(player, store_id, ResupplyDenyReason::StoreNotFound);
        };

        let mut store = entry.lock();
        let now = self.clock.now();

        let Some(mut loadout) = self.loadouts.get_mut(&player) else {
            return self.deny(player, store_id, ResupplyDenyReason::PlayerNotFound);
        };

        if let Err(reason) = self.check(&mut store, loadout.team, player, now) {
            drop(loadout);
            return self.deny(player, store_id, reason);
        }

        let deficit = loadout.kit.deficit();
        if deficit == 0 {
            drop(loadout);
            return self.deny(player, store_id, ResupplyDenyReason::KitFull);
        }

        let cost = loadout.kit.rules().cost_per_unit.max(1);
        if store.remaining < cost {
            // leftovers stay for cheaper kits
            drop(loadout);
            return self.deny(player, store_id, ResupplyDenyReason::InsufficientStock);
        }
        let amount = loadout.kit.grantable(requested, store.remaining);
        if amount == 0 {
            drop(loadout);
            return self.deny(player, store_id, ResupplyDenyReason::Depleted);
        }

        store.draw(player, amount * cost, now);
        loadout.kit.refill(amount);
        drop(loadout);

        let store_remaining = store.remaining;
        let partial = amount < requested.min(deficit);
        self.notifier.emit(EngineEvent::Resupplied {
            player,
            store: store_id,
            amount,
            requested,
            partial,
        });
        if store_remaining == 0 {
            self.notifier
                .emit(EngineEvent::StoreDepleted { store: store_id });
            info!(store = %store_id, "Ammo store depleted");
        }
        drop(store);

        self.recorder.record(StatRecord::Resupply {
            player,
            store: store_id,
            amount,
            at: Utc::now(),
        });
        info!(player = %player, store = %store_id, amount, partial, "Player resupplied");

        ResupplyOutcome::Resupplied {
            amount,
            partial,
            store_remaining,
        }
    }

    /// Top the player's kit up as far as the store allows
    pub fn resupply_kit(&self, player: PlayerId, store_id: StoreId) -> ResupplyOutcome {
        let deficit = self
            .loadouts
            .get(&player)
            .map(|l| l.kit.deficit())
            .unwrap_or(0);
        self.request_resupply(player, store_id, deficit)
    }

    fn check(
        &self,
        store: &mut AmmoStore,
        team: TeamId,
        player: PlayerId,
        now: Instant,
    ) -> Result<(), ResupplyDenyReason> {
        if store.is_removed() {
            return Err(ResupplyDenyReason::StoreNotFound);
        }
        if store.team != team {
            return Err(ResupplyDenyReason::WrongTeam);
        }
        let in_range = self
            .world
            .player_position(player)
            .is_some_and(|pos| pos.distance_2d(&store.position) <= self.range);
        if !in_range {
            return Err(ResupplyDenyReason::OutOfRange);
        }
        if store.on_cooldown(player, now, self.cooldown) {
            return Err(ResupplyDenyReason::OnCooldown);
        }
        if store.replenish_if_due(now) {
            self.notifier.emit(EngineEvent::StoreReplenished {
                store: store.id,
                remaining: store.remaining,
            });
            debug!(store = %store.id, "Ammo store refilled after depletion");
        }
        if store.remaining == 0 {
            return Err(ResupplyDenyReason::Depleted);
        }
        Ok(())
    }

    fn deny(&self, player: PlayerId, store: StoreId, reason: ResupplyDenyReason) -> ResupplyOutcome {
        debug!(player = %player, store = %store, reason = reason.code(), "Resupply denied");
        self.notifier
            .emit(EngineEvent::resupply_denied(player, store, reason));
        ResupplyOutcome::Denied(reason)
    }
}
