//! Kit ammo capacity rules

use serde::{Deserialize, Serialize};

/// Player kit roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KitRole {
    Rifleman,
    Medic,
    AutomaticRifleman,
    Grenadier,
    AntiTank,
    Crewman,
}

impl Default for KitRole {
    fn default() -> Self {
        Self::Rifleman
    }
}

/// Ammo limits per kit role
#[derive(Debug, Clone, Copy)]
pub struct KitRules {
    /// Kit ammo units carried when full
    pub max_ammo: u32,
    /// Store units drawn per kit ammo unit
    pub cost_per_unit: u32,
}

impl KitRules {
    pub fn for_role(role: KitRole) -> Self {
        match role {
            KitRole::Rifleman => Self {
                max_ammo: 60,
                cost_per_unit: 1,
            },
            KitRole::Medic => Self {
                max_ammo: 40,
                cost_per_unit: 1,
            },
            KitRole::AutomaticRifleman => Self {
                max_ammo: 100,
                cost_per_unit: 1,
            },
            KitRole::Grenadier => Self {
                max_ammo: 60,
                cost_per_unit: 2,
            },
            KitRole::AntiTank => Self {
                max_ammo: 40,
                cost_per_unit: 3,
            },
            KitRole::Crewman => Self {
                max_ammo: 20,
                cost_per_unit: 1,
            },
        }
    }
}

/// Ammo currently carried by a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayerKit {
    pub role: KitRole,
    pub ammo: u32,
}

impl PlayerKit {
    /// Freshly spawned kits are full
    pub fn full(role: KitRole) -> Self {
        Self {
            role,
            ammo: KitRules::for_role(role).max_ammo,
        }
    }

    pub fn with_ammo(role: KitRole, ammo: u32) -> Self {
        Self {
            role,
            ammo: ammo.min(KitRules::for_role(role).max_ammo),
        }
    }

    pub fn rules(&self) -> KitRules {
        KitRules::for_role(self.role)
    }

    pub fn deficit(&self) -> u32 {
        self.rules().max_ammo.saturating_sub(self.ammo)
    }

    pub fn spend(&mut self, units: u32) {
        self.ammo = self.ammo.saturating_sub(units);
    }

    /// Kit units that can be granted given a request and what the store holds
    pub fn grantable(&self, requested: u32, store_remaining: u32) -> u32 {
        let affordable = store_remaining / self.rules().cost_per_unit.max(1);
        requested.min(self.deficit()).min(affordable)
    }

    pub fn refill(&mut self, units: u32) {
        self.ammo = (self.ammo + units).min(self.rules().max_ammo);
    }
}
