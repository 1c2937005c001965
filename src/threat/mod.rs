//! Vehicle missile threats: the per-vehicle tracker and the state machine driving it

pub mod machine;
pub mod tracker;

pub use machine::ThreatStateMachine;
pub use tracker::{ThreatView, VehicleThreat};
