//! Deploy backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::stage::Capability;

/// A template apply request
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Target environment name
    pub target: String,

    /// Template body (a structured infrastructure description)
    pub template: String,

    /// Parameter values, including deploy-time overrides
    pub parameters: BTreeMap<String, String>,

    /// Capabilities declared up front
    pub capabilities: Vec<Capability>,

    /// Replace the target cleanly when an in-place update fails
    pub replace_on_failure: bool,
}

/// How an apply resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Target did not exist and was created
    Created,
    /// Target existed and was updated in place
    Updated,
    /// Template and parameters matched the deployed state; nothing changed
    NoChanges,
    /// In-place update failed and the target was cleanly replaced
    Replaced,
}

/// Error types for deploys
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("template for target '{target}' is not valid: {reason}")]
    InvalidTemplate { target: String, reason: String },

    #[error("template requires capability '{required}' which was not declared")]
    MissingCapability { required: String },

    #[error("apply to target '{target}' failed (rolled back: {rolled_back}): {reason}")]
    ApplyFailed {
        target: String,
        rolled_back: bool,
        reason: String,
    },

    #[error("deploy backend error: {0}")]
    Internal(String),
}

/// Trait for deploy backends
///
/// `apply` must leave the target either fully at the new state, fully at
/// the previous state, or (with replace-on-failure) cleanly recreated.
/// A partially applied target is never acceptable.
#[async_trait]
pub trait DeployBackend: Send + Sync {
    async fn apply(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError>;
}

/// What a target environment currently holds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetState {
    pub template: serde_json::Value,
    pub parameters: BTreeMap<String, String>,
}

/// Directory-backed target environment
///
/// Each target is a directory holding `current.json` (the applied state)
/// and `previous.json` (the state before the last update, kept for
/// rollback). Templates must be JSON; a template may declare required
/// capabilities under a top-level `"requires"` list.
#[derive(Debug, Clone)]
pub struct LocalTargetEnvironment {
    root: PathBuf,
}

impl LocalTargetEnvironment {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn target_dir(&self, target: &str) -> PathBuf {
        self.root.join(target)
    }

    fn current_path(&self, target: &str) -> PathBuf {
        self.target_dir(target).join("current.json")
    }

    fn previous_path(&self, target: &str) -> PathBuf {
        self.target_dir(target).join("previous.json")
    }

    /// The deployed state of a target, if it exists
    pub fn current_state(&self, target: &str) -> Result<Option<TargetState>, DeployError> {
        let path = self.current_path(target);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| DeployError::Internal(e.to_string()))?;
        let state = serde_json::from_str(&contents)
            .map_err(|e| DeployError::Internal(format!("corrupt target state: {}", e)))?;
        Ok(Some(state))
    }

    /// The retained pre-update state of a target, if any
    pub fn previous_state(&self, target: &str) -> Result<Option<TargetState>, DeployError> {
        let path = self.previous_path(target);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| DeployError::Internal(e.to_string()))?;
        let state = serde_json::from_str(&contents)
            .map_err(|e| DeployError::Internal(format!("corrupt target state: {}", e)))?;
        Ok(Some(state))
    }

    fn write_state(&self, path: &PathBuf, state: &TargetState) -> std::io::Result<()> {
        // Write through a temp file so a crash never leaves a torn state.
        let serialized = serde_json::to_string_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn validate(&self, request: &DeployRequest) -> Result<serde_json::Value, DeployError> {
        let template: serde_json::Value =
            serde_json::from_str(&request.template).map_err(|e| DeployError::InvalidTemplate {
                target: request.target.clone(),
                reason: e.to_string(),
            })?;

        if let Some(required) = template.get("requires").and_then(|r| r.as_array()) {
            for entry in required {
                let name = entry.as_str().unwrap_or_default();
                match Capability::parse(name) {
                    Some(cap) if request.capabilities.contains(&cap) => {}
                    Some(cap) => {
                        return Err(DeployError::MissingCapability {
                            required: cap.as_str().to_string(),
                        })
                    }
                    None => {
                        return Err(DeployError::InvalidTemplate {
                            target: request.target.clone(),
                            reason: format!("unknown required capability '{}'", name),
                        })
                    }
                }
            }
        }

        Ok(template)
    }
}

#[async_trait]
impl DeployBackend for LocalTargetEnvironment {
    async fn apply(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError> {
        let template = self.validate(request)?;
        let next = TargetState {
            template,
            parameters: request.parameters.clone(),
        };

        let dir = self.target_dir(&request.target);
        std::fs::create_dir_all(&dir).map_err(|e| DeployError::Internal(e.to_string()))?;

        let current = self.current_state(&request.target)?;
        let current_path = self.current_path(&request.target);

        match current {
            None => {
                self.write_state(&current_path, &next)
                    .map_err(|e| DeployError::Internal(e.to_string()))?;
                info!("Created target '{}'", request.target);
                Ok(DeployOutcome::Created)
            }
            Some(ref deployed) if *deployed == next => {
                debug!("Target '{}' already at requested state", request.target);
                Ok(DeployOutcome::NoChanges)
            }
            Some(deployed) => {
                self.write_state(&self.previous_path(&request.target), &deployed)
                    .map_err(|e| DeployError::Internal(e.to_string()))?;

                match self.write_state(&current_path, &next) {
                    Ok(()) => {
                        info!("Updated target '{}' in place", request.target);
                        Ok(DeployOutcome::Updated)
                    }
                    Err(update_err) if request.replace_on_failure => {
                        warn!(
                            "In-place update of '{}' failed, replacing: {}",
                            request.target, update_err
                        );
                        let _ = std::fs::remove_file(&current_path);
                        self.write_state(&current_path, &next).map_err(|e| {
                            DeployError::ApplyFailed {
                                target: request.target.clone(),
                                rolled_back: true,
                                reason: format!("replacement also failed: {}", e),
                            }
                        })?;
                        Ok(DeployOutcome::Replaced)
                    }
                    Err(update_err) => {
                        // Put the retained state back so the target is never
                        // left partially applied.
                        let restored = self
                            .write_state(&current_path, &deployed)
                            .is_ok();
                        Err(DeployError::ApplyFailed {
                            target: request.target.clone(),
                            rolled_back: restored,
                            reason: update_err.to_string(),
                        })
                    }
                }
            }
        }
    }
}
