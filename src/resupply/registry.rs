//! Ammo store registry - resupply points, remaining capacity and cooldowns

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::RegistryError;
use crate::types::{PlayerId, Position, StoreId, TeamId};
use crate::util::time::has_elapsed;

/// Stock state of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Stocked,
    /// Emptied at the given instant; refills after the replenish period
    Depleted { since: Instant },
}

/// A limited-capacity ammo source
#[derive(Debug, Clone)]
pub struct AmmoStore {
    pub id: StoreId,
    pub team: TeamId,
    pub position: Position,
    pub capacity: u32,
    pub remaining: u32,
    pub status: StoreStatus,
    /// Delay before a depleted store refills, `None` for stores that never refill on their own
    pub replenish_after: Option<Duration>,
    /// Last successful draw per player
    last_use: HashMap<PlayerId, Instant>,
    removed: bool,
}

impl AmmoStore {
    pub fn new(team: TeamId, position: Position, capacity: u32) -> Self {
        Self {
            id: StoreId::new(),
            team,
            position,
            capacity,
            remaining: capacity,
            status: StoreStatus::Stocked,
            replenish_after: None,
            last_use: HashMap::new(),
            removed: false,
        }
    }

    pub fn with_id(mut self, id: StoreId) -> Self {
        self.id = id;
        self
    }

    pub fn with_replenish(mut self, after: Duration) -> Self {
        self.replenish_after = Some(after);
        self
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn on_cooldown(&self, player: PlayerId, now: Instant, cooldown: Duration) -> bool {
        !has_elapsed(now, self.last_use.get(&player).copied(), cooldown)
    }

    /// Refill if the replenish timer has lapsed; returns true when it did
    pub fn replenish_if_due(&mut self, now: Instant) -> bool {
        match (self.status, self.replenish_after) {
            (StoreStatus::Depleted { since }, Some(after)) if has_elapsed(now, Some(since), after) => {
                self.remaining = self.capacity;
                self.status = StoreStatus::Stocked;
                true
            }
            _ => false,
        }
    }

    /// Take `units` from the store; caller has already clamped to `remaining`
    pub fn draw(&mut self, player: PlayerId, units: u32, now: Instant) {
        debug_assert!(units <= self.remaining);
        self.remaining = self.remaining.saturating_sub(units);
        self.last_use.insert(player, now);
        if self.remaining == 0 {
            self.status = StoreStatus::Depleted { since: now };
        }
    }

    pub fn add(&mut self, units: u32) {
        self.remaining = self.remaining.saturating_add(units).min(self.capacity);
        if self.remaining > 0 {
            self.status = StoreStatus::Stocked;
        }
    }

    /// Forget per-player cooldowns that can no longer matter
    pub fn prune_cooldowns(&mut self, now: Instant, cooldown: Duration) {
        self.last_use
            .retain(|_, used| !has_elapsed(now, Some(*used), cooldown));
    }
}

/// Read-only view for HUD collaborators
#[derive(Debug, Clone, Serialize)]
pub struct StoreView {
    pub id: StoreId,
    pub team: TeamId,
    pub position: Position,
    pub capacity: u32,
    pub remaining: u32,
    pub depleted: bool,
}

impl From<&AmmoStore> for StoreView {
    fn from(store: &AmmoStore) -> Self {
        Self {
            id: store.id,
            team: store.team,
            position: store.position,
            capacity: store.capacity,
            remaining: store.remaining,
            depleted: matches!(store.status, StoreStatus::Depleted { .. }),
        }
    }
}

pub(crate) type StoreEntry = Arc<Mutex<AmmoStore>>;

/// Registry of all ammo stores, one lock per store
pub struct AmmoStoreRegistry {
    entries: DashMap<StoreId, StoreEntry>,
}

impl AmmoStoreRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, store: AmmoStore) -> Result<StoreId, RegistryError> {
        let id = store.id;
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateStore(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(store)));
                Ok(id)
            }
        }
    }

    pub(crate) fn get(&self, id: &StoreId) -> Option<StoreEntry> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    pub(crate) fn remove(&self, id: &StoreId) -> Result<AmmoStore, RegistryError> {
        let (_, entry) = self
            .entries
            .remove(id)
            .ok_or(RegistryError::UnknownStore(*id))?;
        let mut store = entry.lock();
        store.removed = true;
        Ok(store.clone())
    }

    pub fn view(&self, id: &StoreId) -> Option<StoreView> {
        self.get(id).map(|e| StoreView::from(&*e.lock()))
    }

    pub(crate) fn all(&self) -> Vec<StoreEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AmmoStoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_to_zero_marks_depleted() {
        let now = Instant::now();
        let mut store = AmmoStore::new(TeamId(1), Position::default(), 30);
        store.draw(PlayerId(1), 10, now);
        assert_eq!(store.status, StoreStatus::Stocked);
        store.draw(PlayerId(2), 20, now);
        assert_eq!(store.remaining, 0);
        assert_eq!(store.status, StoreStatus::Depleted { since: now });
    }

    #[test]
    fn replenish_waits_for_timer() {
        let now = Instant::now();
        let mut store = AmmoStore::new(TeamId(1), Position::default(), 30)
            .with_replenish(Duration::from_secs(60));
        store.draw(PlayerId(1), 30, now);

        assert!(!store.replenish_if_due(now + Duration::from_secs(59)));
        assert_eq!(store.remaining, 0);
        assert!(store.replenish_if_due(now + Duration::from_secs(60)));
        assert_eq!(store.remaining, 30);
        assert_eq!(store.status, StoreStatus::Stocked);
    }

    #[test]
    fn stores_without_timer_stay_empty() {
        let now = Instant::now();
        let mut store = AmmoStore::new(TeamId(1), Position::default(), 5);
        store.draw(PlayerId(1), 5, now);
        assert!(!store.replenish_if_due(now + Duration::from_secs(3600)));
    }

    #[test]
    fn cooldown_is_per_player() {
        let now = Instant::now();
        let cooldown = Duration::from_secs(5);
        let mut store = AmmoStore::new(TeamId(1), Position::default(), 100);
        store.draw(PlayerId(1), 10, now);

        assert!(store.on_cooldown(PlayerId(1), now, cooldown));
        assert!(!store.on_cooldown(PlayerId(2), now, cooldown));
        assert!(!store.on_cooldown(PlayerId(1), now + cooldown, cooldown));

        store.prune_cooldowns(now + cooldown, cooldown);
        assert!(store.last_use.is_empty());
    }

    #[test]
    fn registry_keys_stores_by_their_id() {
        let registry = AmmoStoreRegistry::new();
        let id = StoreId::new();
        let store = AmmoStore::new(TeamId(1), Position::default(), 20).with_id(id);

        assert_eq!(registry.insert(store.clone()).unwrap(), id);
        assert_eq!(registry.insert(store), Err(RegistryError::DuplicateStore(id)));
        assert_eq!(registry.view(&id).unwrap().remaining, 20);

        let removed = registry.remove(&id).unwrap();
        assert!(removed.is_removed());
        assert!(registry.is_empty());
    }

    #[test]
    fn add_is_capped_at_capacity() {
        let now = Instant::now();
        let mut store = AmmoStore::new(TeamId(1), Position::default(), 50);
        store.draw(PlayerId(1), 50, now);
        store.add(80);
        assert_eq!(store.remaining, 50);
        assert_eq!(store.status, StoreStatus::Stocked);
    }
}
