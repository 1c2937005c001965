//! Application wiring

pub mod engine;

pub use engine::Engine;
