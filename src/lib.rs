//! Deployment & logistics engine for a persistent military-simulation game server
//!
//! Three in-process cores, each guarding its objects with per-object locks:
//! - [`deploy`]: teleports to rally points, FOBs, vehicles and main bases
//! - [`resupply`]: ammo transactions against limited-capacity stores
//! - [`threat`]: per-vehicle missile-warning state and countermeasures
//!
//! [`app::Engine`] is the entry point used by the hosting game loop.

pub mod app;
pub mod config;
pub mod deploy;
pub mod error;
pub mod events;
pub mod notify;
pub mod resupply;
pub mod threat;
pub mod types;
pub mod util;
pub mod world;

pub use app::Engine;
pub use config::EngineConfig;
pub use events::EngineEvent;
