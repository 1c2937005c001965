//! Deployment: the deployable registry and the orchestrator that owns it

pub mod orchestrator;
pub mod registry;

pub use orchestrator::{DeployOutcome, DeploymentOrchestrator, PlayerDeploymentState};
pub use registry::{Deployable, DeployableKind, DeployableStatus, DeployableView};
