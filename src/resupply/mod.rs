//! Resupply: ammo store registry, kit rules and the transaction orchestrator

pub mod kit;
pub mod orchestrator;
pub mod registry;

pub use kit::{KitRole, KitRules, PlayerKit};
pub use orchestrator::{ResupplyOrchestrator, ResupplyOutcome};
pub use registry::{AmmoStore, StoreStatus, StoreView};
