//! Game simulation seam
//!
//! The hosting game loop implements [`GameWorld`]; the engine only asks it
//! where players are, whether enemies are near a point, and to move a player.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::WorldError;
use crate::types::{PlayerId, Position, TeamId};

pub trait GameWorld: Send + Sync {
    /// Current position of a spawned player
    fn player_position(&self, player: PlayerId) -> Option<Position>;

    /// Whether any player not on `team` is within `radius` of `center`
    fn enemies_within(&self, team: TeamId, center: Position, radius: f32) -> bool;

    /// Move a player; must be instantaneous from the engine's point of view
    fn teleport(&self, player: PlayerId, to: Position) -> Result<(), WorldError>;
}

pub type SharedWorld = Arc<dyn GameWorld>;

#[derive(Debug, Clone, Copy)]
struct Avatar {
    team: TeamId,
    position: Position,
}

/// In-memory world used by the headless host and tests
#[derive(Default)]
pub struct InMemoryWorld {
    avatars: DashMap<PlayerId, Avatar>,
    teleports_blocked: AtomicBool,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place_player(&self, player: PlayerId, team: TeamId, position: Position) {
        self.avatars.insert(player, Avatar { team, position });
    }

    pub fn move_player(&self, player: PlayerId, position: Position) {
        if let Some(mut avatar) = self.avatars.get_mut(&player) {
            avatar.position = position;
        }
    }

    pub fn remove_player(&self, player: PlayerId) {
        self.avatars.remove(&player);
    }

    /// Make every subsequent teleport fail (simulates an engine-side refusal)
    pub fn block_teleports(&self, blocked: bool) {
        self.teleports_blocked.store(blocked, Ordering::Relaxed);
    }
}

impl GameWorld for InMemoryWorld {
    fn player_position(&self, player: PlayerId) -> Option<Position> {
        self.avatars.get(&player).map(|a| a.position)
    }

    fn enemies_within(&self, team: TeamId, center: Position, radius: f32) -> bool {
        self.avatars.iter().any(|entry| {
            let avatar = entry.value();
            avatar.team != team && avatar.position.distance_2d(&center) <= radius
        })
    }

    fn teleport(&self, player: PlayerId, to: Position) -> Result<(), WorldError> {
        if self.teleports_blocked.load(Ordering::Relaxed) {
            return Err(WorldError::TeleportRejected("teleports disabled".to_string()));
        }
        match self.avatars.get_mut(&player) {
            Some(mut avatar) => {
                avatar.position = to;
                Ok(())
            }
            None => Err(WorldError::PlayerNotInWorld(player)),
        }
    }
}
