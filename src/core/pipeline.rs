//! Pipeline domain model

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::artifact::ArtifactBucket;
use crate::core::buildspec::build_project;
use crate::core::config::{NotificationConfig, PipelineConfig};
use crate::core::key::EncryptionKey;
use crate::core::role::{AccessRole, PermissionKind, ServicePrincipal};
use crate::core::stage::{
    Action, ActionOp, CheckoutSpec, DeploySpec, DeployTarget, SecretRef, Stage, StageKind,
};
use crate::core::state::{ActionState, RunState};
use crate::notify::TopicRef;

/// Name of the artifact produced by the checkout action
pub const SOURCE_ARTIFACT: &str = "source";

/// What happens to a trigger arriving while a run is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerPolicy {
    /// Hold one pending run; further triggers are dropped until it starts
    QueueOne,
    /// Hold one pending run; a newer trigger replaces the pending one
    Supersede,
    /// Drop triggers while a run is in flight
    DropNew,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        TriggerPolicy::QueueOne
    }
}

/// A fully wired pipeline definition
///
/// Built once from validated configuration; defining a pipeline performs
/// no I/O, execution happens separately through the engine.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// The single role every action executes under
    pub role: AccessRole,

    /// Key wrapping all artifact storage
    pub key: EncryptionKey,

    /// Bucket artifacts are passed through
    pub bucket: ArtifactBucket,

    /// Strictly ordered stages
    pub stages: Vec<Stage>,

    /// Current run state
    pub state: RunState,

    /// Trigger coalescing policy
    pub trigger_policy: TriggerPolicy,

    /// Notification fan-out, absent when disabled
    pub notifications: Option<NotificationConfig>,
}

impl Pipeline {
    /// Build a pipeline from validated configuration
    ///
    /// Creates the role and key, wires every grant each stage needs, and
    /// lays out the Source, Build, and Deploy stages. A grant the target
    /// resource cannot support fails construction.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let mut role = AccessRole::new(
            &config.role.name,
            &config.role.description,
            &config.role.policy,
        );
        role.trust(ServicePrincipal::Checkout);
        role.trust(ServicePrincipal::Build);
        role.trust(ServicePrincipal::Deploy);

        let mut key = EncryptionKey::new(&config.key.description);
        key.grant_encrypt_decrypt(&role);
        role.grant(&key, PermissionKind::EncryptDecrypt)?;

        let bucket = ArtifactBucket::new(&config.bucket.name);
        role.grant(&bucket, PermissionKind::Read)?;
        role.grant(&bucket, PermissionKind::Write)?;

        let token_secret = SecretRef::new(&config.source.token_secret);
        role.grant(&token_secret, PermissionKind::Read)?;

        let checkout = Action::new(
            "checkout",
            vec![],
            vec![SOURCE_ARTIFACT.to_string()],
            ActionOp::Checkout(CheckoutSpec {
                owner: config.source.owner.clone(),
                repo: config.source.repo.clone(),
                branch: config.source.branch.clone(),
                token_secret,
            }),
        );

        let mut build_actions = Vec::with_capacity(config.builds.len());
        for build in &config.builds {
            let project = build_project(
                &build.project,
                &config.install,
                &config.build,
                &build.post_build,
                &build.output_dir,
                &build.output_files,
                &role.name,
            );
            role.grant(&project, PermissionKind::StartBuild)?;

            build_actions.push(Action::new(
                &build.project,
                vec![SOURCE_ARTIFACT.to_string()],
                vec![build.artifact.clone()],
                ActionOp::Build(project),
            ));
        }

        let target = DeployTarget::new(&config.deploy.target);
        role.grant(&target, PermissionKind::Deploy)?;

        let deploy = Action::new(
            "deploy",
            vec![
                config.deploy.template_artifact.clone(),
                config.deploy.code_artifact.clone(),
            ],
            vec![],
            ActionOp::Deploy(DeploySpec {
                target,
                template_artifact: config.deploy.template_artifact.clone(),
                template_file: config.deploy.template_file.clone(),
                code_artifact: config.deploy.code_artifact.clone(),
                bucket_parameter: config.deploy.bucket_parameter.clone(),
                key_parameter: config.deploy.key_parameter.clone(),
                capabilities: config.capabilities(),
                replace_on_failure: config.deploy.replace_on_failure,
            }),
        );

        if let Some(notifications) = &config.notifications {
            role.grant(&TopicRef::new(&notifications.topic), PermissionKind::Publish)?;
        }

        Ok(Pipeline {
            name: config.name.clone(),
            role,
            key,
            bucket,
            stages: vec![
                Stage::new("Source", StageKind::Source, vec![checkout]),
                Stage::new("Build", StageKind::Build, build_actions),
                Stage::new("Deploy", StageKind::Deploy, vec![deploy]),
            ],
            state: RunState::new(),
            trigger_policy: config.trigger_policy,
            notifications: config.notifications.clone(),
        })
    }

    /// The checkout action; by construction the first action of the
    /// first stage
    pub fn checkout_action(&self) -> &Action {
        &self.stages[0].actions[0]
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.stages.iter().find_map(|s| s.action(name))
    }

    pub fn action_mut(&mut self, name: &str) -> Option<&mut Action> {
        self.stages
            .iter_mut()
            .find_map(|s| s.actions.iter_mut().find(|a| a.name == name))
    }

    /// Total number of actions across all stages
    pub fn total_actions(&self) -> usize {
        self.stages.iter().map(|s| s.actions.len()).sum()
    }

    /// Whether every action reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.stages
            .iter()
            .flat_map(|s| &s.actions)
            .all(|a| a.state.is_terminal())
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.state.status, crate::core::state::RunStatus::Failed)
    }

    /// Reset run state for a fresh execution of the same definition
    pub fn reset_for_run(&mut self) {
        self.state = RunState::new();
        for stage in &mut self.stages {
            for action in &mut stage.actions {
                action.state = ActionState::Pending;
            }
        }
    }
}
