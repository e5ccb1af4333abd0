//! Stage and action descriptors

use serde::{Deserialize, Serialize};

use crate::core::buildspec::BuildProject;
use crate::core::role::{Grantable, PermissionKind};
use crate::core::state::ActionState;

/// Position of a stage in the fixed source → build → deploy sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    Source,
    Build,
    Deploy,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Source => "Source",
            StageKind::Build => "Build",
            StageKind::Deploy => "Deploy",
        }
    }
}

/// Reference to a credential held by the secret store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
}

impl SecretRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Grantable for SecretRef {
    fn resource_id(&self) -> String {
        format!("secret/{}", self.name)
    }

    fn supported_permissions(&self) -> &'static [PermissionKind] {
        &[PermissionKind::Read]
    }
}

/// The environment a deploy action applies its template to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTarget {
    pub name: String,
}

impl DeployTarget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Grantable for DeployTarget {
    fn resource_id(&self) -> String {
        format!("target/{}", self.name)
    }

    fn supported_permissions(&self) -> &'static [PermissionKind] {
        &[PermissionKind::Deploy]
    }
}

/// Elevated capabilities a deploy declares up front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Template may create named identities and roles
    CreateIdentities,
    /// Template may expand macros/nested descriptions during apply
    ExpandMacros,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CreateIdentities => "create-identities",
            Capability::ExpandMacros => "expand-macros",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create-identities" => Some(Capability::CreateIdentities),
            "expand-macros" => Some(Capability::ExpandMacros),
            _ => None,
        }
    }
}

/// Checkout action parameters
#[derive(Debug, Clone)]
pub struct CheckoutSpec {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token_secret: SecretRef,
}

/// Deploy action parameters
#[derive(Debug, Clone)]
pub struct DeploySpec {
    /// Target environment, created on first deploy
    pub target: DeployTarget,

    /// Artifact holding the template
    pub template_artifact: String,

    /// Path of the template file within that artifact
    pub template_file: String,

    /// Artifact whose stored location is substituted into the template
    pub code_artifact: String,

    /// Template parameter receiving the code artifact's bucket
    pub bucket_parameter: String,

    /// Template parameter receiving the code artifact's object key
    pub key_parameter: String,

    /// Capabilities declared up front
    pub capabilities: Vec<Capability>,

    /// Replace the target cleanly when an in-place update fails
    pub replace_on_failure: bool,
}

/// The work an action performs
#[derive(Debug, Clone)]
pub enum ActionOp {
    Checkout(CheckoutSpec),
    Build(BuildProject),
    Deploy(DeploySpec),
}

/// A single unit of work within a stage
#[derive(Debug, Clone)]
pub struct Action {
    /// Action name, unique within the pipeline
    pub name: String,

    /// Artifacts consumed (must exist before the action runs)
    pub inputs: Vec<String>,

    /// Artifacts produced (handed to the store on success)
    pub outputs: Vec<String>,

    /// What the action does
    pub op: ActionOp,

    /// Runtime state
    pub state: ActionState,
}

impl Action {
    pub fn new(name: &str, inputs: Vec<String>, outputs: Vec<String>, op: ActionOp) -> Self {
        Self {
            name: name.to_string(),
            inputs,
            outputs,
            op,
            state: ActionState::Pending,
        }
    }

    pub fn is_checkout(&self) -> bool {
        matches!(self.op, ActionOp::Checkout(_))
    }

    pub fn is_build(&self) -> bool {
        matches!(self.op, ActionOp::Build(_))
    }

    pub fn is_deploy(&self) -> bool {
        matches!(self.op, ActionOp::Deploy(_))
    }
}

/// An ordered phase of the pipeline holding concurrent actions
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub kind: StageKind,
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn new(name: &str, kind: StageKind, actions: Vec<Action>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            actions,
        }
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }
}
