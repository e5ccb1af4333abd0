//! Action executor - runs a single action against the backends

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::{
    Backends, BuildError, DeployError, DeployOutcome, DeployRequest, RepoCoordinates, SecretError,
    SourceError,
};
use crate::core::artifact::{ArtifactBundle, ArtifactError, ArtifactStore};
use crate::core::buildspec::BuildProject;
use crate::core::role::{AccessRole, Grantable, PermissionKind};
use crate::core::stage::{Action, ActionOp, CheckoutSpec, DeploySpec};

/// Why an action failed
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("role '{role}' is not granted {permission} on {resource}")]
    AccessDenied {
        role: String,
        resource: String,
        permission: PermissionKind,
    },

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("artifact '{artifact}' does not contain template file '{file}'")]
    TemplateFileMissing { artifact: String, file: String },

    #[error("template file '{file}' is not valid UTF-8")]
    TemplateNotText { file: String },
}

/// Result of a successful action
#[derive(Debug, Clone)]
pub struct ActionReport {
    /// Artifacts the action produced
    pub outputs: Vec<String>,

    /// How the deploy resolved, for deploy actions
    pub deploy_outcome: Option<DeployOutcome>,
}

/// Shared run-scoped context an action executes in
#[derive(Clone)]
pub struct RunContext {
    /// The single role every action assumes
    pub role: Arc<AccessRole>,

    /// Artifact store for this run's namespace
    pub store: Arc<Mutex<ArtifactStore>>,
}

/// Executes a single action through the appropriate backend
#[derive(Clone)]
pub struct ActionExecutor {
    backends: Backends,
}

impl ActionExecutor {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    fn check_grant(
        role: &AccessRole,
        resource: &dyn Grantable,
        permission: PermissionKind,
    ) -> Result<(), ActionError> {
        if role.allows(&resource.resource_id(), permission) {
            Ok(())
        } else {
            Err(ActionError::AccessDenied {
                role: role.name.clone(),
                resource: resource.resource_id(),
                permission,
            })
        }
    }

    /// Execute an action and return what it produced
    pub async fn execute(
        &self,
        action: &Action,
        context: &RunContext,
    ) -> Result<ActionReport, ActionError> {
        info!("Executing action: {}", action.name);

        match &action.op {
            ActionOp::Checkout(spec) => self.execute_checkout(action, spec, context).await,
            ActionOp::Build(project) => self.execute_build(action, project, context).await,
            ActionOp::Deploy(spec) => self.execute_deploy(action, spec, context).await,
        }
    }

    async fn execute_checkout(
        &self,
        action: &Action,
        spec: &CheckoutSpec,
        context: &RunContext,
    ) -> Result<ActionReport, ActionError> {
        Self::check_grant(&context.role, &spec.token_secret, PermissionKind::Read)?;

        // Resolve the credential first; a missing secret fails the action
        // before any artifact is produced.
        let credential = self.backends.secrets.resolve(&spec.token_secret.name).await?;
        debug!("Resolved credential for {}", spec.token_secret.name);

        let coords = RepoCoordinates {
            owner: spec.owner.clone(),
            repo: spec.repo.clone(),
            branch: spec.branch.clone(),
        };
        let bundle = self.backends.source.checkout(&coords, &credential).await?;

        let mut store = context.store.lock().await;
        for output in &action.outputs {
            store.put(&context.role, output, &action.name, bundle.clone())?;
        }

        Ok(ActionReport {
            outputs: action.outputs.clone(),
            deploy_outcome: None,
        })
    }

    async fn execute_build(
        &self,
        action: &Action,
        project: &BuildProject,
        context: &RunContext,
    ) -> Result<ActionReport, ActionError> {
        Self::check_grant(&context.role, project, PermissionKind::StartBuild)?;

        let input = {
            let store = context.store.lock().await;
            let mut merged = ArtifactBundle::new();
            for name in &action.inputs {
                let artifact = store.get(&context.role, name)?;
                for path in artifact.bundle.paths() {
                    if let Some(contents) = artifact.bundle.file(path) {
                        merged.insert(path, contents.to_vec());
                    }
                }
            }
            merged
        };

        let output = self.backends.build.run(project, &input).await?;

        let mut store = context.store.lock().await;
        for name in &action.outputs {
            store.put(&context.role, name, &action.name, output.clone())?;
        }

        Ok(ActionReport {
            outputs: action.outputs.clone(),
            deploy_outcome: None,
        })
    }

    async fn execute_deploy(
        &self,
        action: &Action,
        spec: &DeploySpec,
        context: &RunContext,
    ) -> Result<ActionReport, ActionError> {
        Self::check_grant(&context.role, &spec.target, PermissionKind::Deploy)?;

        let (template, code_location) = {
            let store = context.store.lock().await;
            let template_artifact = store.get(&context.role, &spec.template_artifact)?;
            let body = template_artifact
                .bundle
                .file(&spec.template_file)
                .ok_or_else(|| ActionError::TemplateFileMissing {
                    artifact: spec.template_artifact.clone(),
                    file: spec.template_file.clone(),
                })?;
            let template =
                String::from_utf8(body.to_vec()).map_err(|_| ActionError::TemplateNotText {
                    file: spec.template_file.clone(),
                })?;
            let code_location = store.location(&context.role, &spec.code_artifact)?;
            (template, code_location)
        };

        // Substitute the code artifact's live location into the template
        // parameters, decoupling build-time content from the deploy-time
        // code reference.
        let mut parameters = BTreeMap::new();
        parameters.insert(spec.bucket_parameter.clone(), code_location.bucket);
        parameters.insert(spec.key_parameter.clone(), code_location.key);

        let request = DeployRequest {
            target: spec.target.name.clone(),
            template,
            parameters,
            capabilities: spec.capabilities.clone(),
            replace_on_failure: spec.replace_on_failure,
        };

        let outcome = self.backends.deploy.apply(&request).await?;
        info!("Deploy to '{}' resolved as {:?}", spec.target.name, outcome);

        Ok(ActionReport {
            outputs: vec![],
            deploy_outcome: Some(outcome),
        })
    }
}
