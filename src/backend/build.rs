//! Build runner backends

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::backend::source::read_tree;
use crate::core::artifact::ArtifactBundle;
use crate::core::buildspec::BuildProject;

/// Error types for build execution
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{phase} command '{command}' exited with code {exit_code}: {stderr}")]
    CommandFailed {
        phase: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("build timed out after {0} seconds")]
    Timeout(u64),

    #[error("output selector '{selector}' matched no files under '{base_directory}'")]
    UnmatchedSelector {
        selector: String,
        base_directory: String,
    },

    #[error("output directory '{0}' does not exist after the build")]
    MissingOutputDirectory(String),

    #[error("build backend error: {0}")]
    Internal(String),
}

/// Trait for build backends
///
/// A backend runs one project's build specification against an input
/// bundle and returns the selected output files. Retries are not the
/// backend's concern.
#[async_trait]
pub trait BuildBackend: Send + Sync {
    async fn run(
        &self,
        project: &BuildProject,
        input: &ArtifactBundle,
    ) -> Result<ArtifactBundle, BuildError>;
}

/// Build backend that runs phase commands through a shell
///
/// The input bundle is materialized into a scratch workspace, each phase
/// command runs with the workspace as its working directory, and the
/// artifact selection is applied to the declared output directory.
#[derive(Debug, Clone)]
pub struct ShellBuildBackend {
    shell: String,
    timeout_secs: u64,
}

impl ShellBuildBackend {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            timeout_secs: 3600,
        }
    }

    pub fn with_shell(mut self, shell: &str) -> Self {
        self.shell = shell.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn scratch_dir(project: &BuildProject) -> PathBuf {
        std::env::temp_dir().join(format!(
            "pipewright-build-{}-{}",
            project.name,
            uuid::Uuid::new_v4()
        ))
    }

    async fn run_command(
        &self,
        phase: &str,
        command: &str,
        workdir: &Path,
    ) -> Result<(), BuildError> {
        debug!("[{}] {}", phase, command);

        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.shell)
                .arg("-c")
                .arg(command)
                .current_dir(workdir)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| BuildError::Timeout(self.timeout_secs))?;

        let output = result
            .map_err(|e| BuildError::Internal(format!("failed to spawn shell: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(
                "{} command failed with code {}: {}",
                phase, exit_code, command
            );
            return Err(BuildError::CommandFailed {
                phase: phase.to_string(),
                command: command.to_string(),
                exit_code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }

    fn select_outputs(
        project: &BuildProject,
        workdir: &Path,
    ) -> Result<ArtifactBundle, BuildError> {
        let base = workdir.join(&project.spec.artifacts.base_directory);
        if !base.is_dir() {
            return Err(BuildError::MissingOutputDirectory(
                project.spec.artifacts.base_directory.clone(),
            ));
        }

        let produced = read_tree(&base).map_err(|e| BuildError::Internal(e.to_string()))?;

        let mut selected = ArtifactBundle::new();
        for selector in &project.spec.artifacts.files {
            let mut matched = false;
            for path in produced.paths() {
                if selector.matches(path) {
                    matched = true;
                    if let Some(contents) = produced.file(path) {
                        selected.insert(path, contents.to_vec());
                    }
                }
            }
            // A selector that matches nothing means the build contract was
            // violated; fail rather than hand over a thinner artifact.
            if !matched {
                return Err(BuildError::UnmatchedSelector {
                    selector: selector.source().to_string(),
                    base_directory: project.spec.artifacts.base_directory.clone(),
                });
            }
        }

        Ok(selected)
    }

    fn materialize(input: &ArtifactBundle, workdir: &Path) -> std::io::Result<()> {
        for path in input.paths() {
            let dest = workdir.join(path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if let Some(contents) = input.file(path) {
                std::fs::write(&dest, contents)?;
            }
        }
        Ok(())
    }
}

impl Default for ShellBuildBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildBackend for ShellBuildBackend {
    async fn run(
        &self,
        project: &BuildProject,
        input: &ArtifactBundle,
    ) -> Result<ArtifactBundle, BuildError> {
        let workdir = Self::scratch_dir(project);
        std::fs::create_dir_all(&workdir)
            .map_err(|e| BuildError::Internal(format!("failed to create workspace: {}", e)))?;

        Self::materialize(input, &workdir)
            .map_err(|e| BuildError::Internal(format!("failed to materialize input: {}", e)))?;

        let run = async {
            for (phase, commands) in project.spec.phases.ordered() {
                for command in commands {
                    self.run_command(phase, command, &workdir).await?;
                }
            }
            Self::select_outputs(project, &workdir)
        };

        let result = run.await;
        let _ = std::fs::remove_dir_all(&workdir);
        result
    }
}
