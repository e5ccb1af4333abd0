//! Pipeline configuration from YAML
//!
//! All required fields are validated before any component is constructed;
//! a bad configuration never produces a partially built pipeline.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::core::buildspec::FileSelector;
use crate::core::pipeline::{Pipeline, TriggerPolicy};
use crate::core::stage::Capability;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Shared execution role
    pub role: RoleConfig,

    /// Encryption key for the artifact bucket
    pub key: KeyConfig,

    /// Source repository and credential
    pub source: SourceConfig,

    /// Install-phase preamble shared by every build project
    #[serde(default)]
    pub install: Vec<String>,

    /// Build-phase preamble shared by every build project
    #[serde(default)]
    pub build: Vec<String>,

    /// Build projects (one output artifact each)
    pub builds: Vec<BuildConfig>,

    /// Deploy stage parameters
    pub deploy: DeployConfig,

    /// Artifact bucket
    pub bucket: BucketConfig,

    /// Optional notification fan-out; absent means disabled
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,

    /// What happens to triggers arriving while a run is in flight
    #[serde(default)]
    pub trigger_policy: TriggerPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    pub description: String,
    /// Identifier of the base permission policy
    pub policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Name of the stored credential used for checkout
    pub token_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Unique build project name
    pub project: String,

    /// Name of the artifact this project produces
    pub artifact: String,

    /// Commands run after the shared preamble
    #[serde(default)]
    pub post_build: Vec<String>,

    /// Directory (relative to the workspace) holding the outputs
    pub output_dir: String,

    /// Selectors for the files that become the artifact
    pub output_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Target environment name
    pub target: String,

    /// Artifact holding the template
    pub template_artifact: String,

    /// Template file within that artifact
    pub template_file: String,

    /// Artifact whose stored location overrides template parameters
    pub code_artifact: String,

    /// Template parameter receiving the code artifact's bucket
    #[serde(default = "default_bucket_parameter")]
    pub bucket_parameter: String,

    /// Template parameter receiving the code artifact's object key
    #[serde(default = "default_key_parameter")]
    pub key_parameter: String,

    /// Capability flags declared up front
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Replace the target cleanly when an in-place update fails
    #[serde(default = "default_true")]
    pub replace_on_failure: bool,
}

fn default_bucket_parameter() -> String {
    "bucketName".to_string()
}

fn default_key_parameter() -> String {
    "bucketKey".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Topic name build events are published to
    pub topic: String,

    /// Email subscribers; may be empty (topic exists, nobody listens)
    #[serde(default)]
    pub emails: Vec<String>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration; called before any component is built
    pub fn validate(&self) -> Result<()> {
        fn require(value: &str, field: &str) -> Result<()> {
            if value.trim().is_empty() {
                anyhow::bail!("Required field '{}' is empty", field);
            }
            Ok(())
        }

        require(&self.name, "name")?;
        require(&self.role.name, "role.name")?;
        require(&self.role.description, "role.description")?;
        require(&self.role.policy, "role.policy")?;
        require(&self.key.description, "key.description")?;
        require(&self.source.owner, "source.owner")?;
        require(&self.source.repo, "source.repo")?;
        require(&self.source.branch, "source.branch")?;
        require(&self.source.token_secret, "source.token_secret")?;
        require(&self.bucket.name, "bucket.name")?;
        require(&self.deploy.target, "deploy.target")?;
        require(&self.deploy.template_artifact, "deploy.template_artifact")?;
        require(&self.deploy.template_file, "deploy.template_file")?;
        require(&self.deploy.code_artifact, "deploy.code_artifact")?;
        require(&self.deploy.bucket_parameter, "deploy.bucket_parameter")?;
        require(&self.deploy.key_parameter, "deploy.key_parameter")?;

        if self.builds.is_empty() {
            anyhow::bail!("At least one build project is required");
        }

        let mut project_names = HashSet::new();
        let mut artifact_names = HashSet::new();
        for build in &self.builds {
            require(&build.project, "builds[].project")?;
            require(&build.artifact, "builds[].artifact")?;
            require(&build.output_dir, "builds[].output_dir")?;

            if !project_names.insert(&build.project) {
                anyhow::bail!("Duplicate build project name: {}", build.project);
            }
            if !artifact_names.insert(&build.artifact) {
                anyhow::bail!("Duplicate build artifact name: {}", build.artifact);
            }
            if build.output_files.is_empty() {
                anyhow::bail!(
                    "Build project '{}' selects no output files",
                    build.project
                );
            }
        }

        let template_build = self
            .builds
            .iter()
            .find(|b| b.artifact == self.deploy.template_artifact)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "deploy.template_artifact '{}' is not produced by any build project",
                    self.deploy.template_artifact
                )
            })?;

        if !artifact_names.contains(&self.deploy.code_artifact) {
            anyhow::bail!(
                "deploy.code_artifact '{}' is not produced by any build project",
                self.deploy.code_artifact
            );
        }
        if self.deploy.code_artifact == self.deploy.template_artifact {
            anyhow::bail!("deploy.code_artifact and deploy.template_artifact must differ");
        }

        // The deployed template file must be something the template build
        // actually selects; catching the mismatch here beats a dead deploy.
        let file_selected = template_build
            .output_files
            .iter()
            .any(|s| FileSelector::compile(s).matches(&self.deploy.template_file));
        if !file_selected {
            anyhow::bail!(
                "deploy.template_file '{}' does not match any output selector of build project '{}'",
                self.deploy.template_file,
                template_build.project
            );
        }

        for cap in &self.deploy.capabilities {
            if Capability::parse(cap).is_none() {
                anyhow::bail!("Unknown deploy capability: {}", cap);
            }
        }

        if let Some(notifications) = &self.notifications {
            require(&notifications.topic, "notifications.topic")?;
            for email in &notifications.emails {
                if !email.contains('@') {
                    anyhow::bail!("Invalid notification subscriber address: {}", email);
                }
            }
        }

        Ok(())
    }

    /// Parsed capability flags
    pub fn capabilities(&self) -> Vec<Capability> {
        self.deploy
            .capabilities
            .iter()
            .filter_map(|c| Capability::parse(c))
            .collect()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(self)
    }
}
