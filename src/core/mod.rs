//! Core domain models
//!
//! The data structures that define a pipeline: configuration, stages and
//! actions, artifacts, the shared role and key, and run state.

pub mod artifact;
pub mod buildspec;
pub mod config;
pub mod key;
pub mod pipeline;
pub mod role;
pub mod stage;
pub mod state;

pub use artifact::{Artifact, ArtifactBucket, ArtifactBundle, ArtifactStore, ObjectLocation};
pub use buildspec::{BuildProject, BuildSpec};
pub use key::EncryptionKey;
pub use pipeline::{Pipeline, TriggerPolicy, SOURCE_ARTIFACT};
pub use role::{AccessRole, PermissionKind, ServicePrincipal};
pub use stage::{Action, ActionOp, Capability, Stage, StageKind};
pub use state::{ActionState, RunState, RunStatus};
