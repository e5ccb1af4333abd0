//! Test utility functions for pipewright

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use pipewright::backend::{
    Backends, BuildBackend, BuildError, Credential, DeployBackend, DeployError, DeployOutcome,
    DeployRequest, PushEvent, PushListener, RepoCoordinates, SecretError, SecretStore, SourceError,
    SourceProvider,
};
use pipewright::core::buildspec::{BuildProject, FileSelector};
use pipewright::core::state::ActionState;
use pipewright::core::{ArtifactBundle, Pipeline, RunStatus};
use pipewright::execution::{PipelineEngine, RunEvent};

/// Standard pipeline configuration used across scenario tests
pub fn sample_config_yaml() -> &'static str {
    r#"
name: "widget-deployment"

role:
  name: "pipeline-role"
  description: "Execution role shared by all stages"
  policy: "administrator"

key:
  description: "Key for the pipeline artifact bucket"

source:
  owner: "acme"
  repo: "widget-service"
  branch: "main"
  token_secret: "ci-github-token"

install:
  - "npm ci"
build:
  - "npm run build"

builds:
  - project: "build-template"
    artifact: "template"
    post_build:
      - "npx synth -o dist"
    output_dir: "dist"
    output_files:
      - "service.template.json"
  - project: "build-code"
    artifact: "code"
    post_build:
      - "npm run test"
    output_dir: "dist/src"
    output_files:
      - "index.js"

deploy:
  target: "widget-prod"
  template_artifact: "template"
  template_file: "service.template.json"
  code_artifact: "code"
  capabilities:
    - "create-identities"
    - "expand-macros"
  replace_on_failure: true

bucket:
  name: "widget-pipeline-artifacts"
"#
}

/// Build the standard pipeline used across scenario tests
pub fn sample_pipeline() -> Pipeline {
    pipewright::core::config::PipelineConfig::from_yaml(sample_config_yaml())
        .expect("sample config should be valid")
        .to_pipeline()
        .expect("sample pipeline should build")
}

/// Secret store backed by a fixed map
pub struct MockSecretStore {
    secrets: HashMap<String, String>,
}

impl MockSecretStore {
    pub fn with(secrets: &[(&str, &str)]) -> Self {
        Self {
            secrets: secrets
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            secrets: HashMap::new(),
        }
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn resolve(&self, name: &str) -> Result<Credential, SecretError> {
        self.secrets
            .get(name)
            .map(|v| Credential::new(name, v.clone()))
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

/// Source provider returning a fixed bundle and supporting push listeners
pub struct MockSourceProvider {
    bundle: ArtifactBundle,
    listeners: Mutex<Vec<Arc<dyn PushListener>>>,
}

impl MockSourceProvider {
    pub fn returning(bundle: ArtifactBundle) -> Self {
        Self {
            bundle,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn default_source() -> Self {
        Self::returning(
            ArtifactBundle::new()
                .with_file("package.json", b"{\"name\": \"widget-service\"}")
                .with_file("src/index.js", b"module.exports = () => 42;"),
        )
    }

    /// Deliver a push event to every registered listener
    pub fn emit_push(&self, commit: &str) {
        let event = PushEvent {
            coords: RepoCoordinates {
                owner: "acme".to_string(),
                repo: "widget-service".to_string(),
                branch: "main".to_string(),
            },
            commit: commit.to_string(),
        };
        for listener in self.listeners.lock().unwrap().iter() {
            listener.on_push(event.clone());
        }
    }
}

#[async_trait]
impl SourceProvider for MockSourceProvider {
    async fn checkout(
        &self,
        _coords: &RepoCoordinates,
        _credential: &Credential,
    ) -> Result<ArtifactBundle, SourceError> {
        Ok(self.bundle.clone())
    }

    fn subscribe_pushes(
        &self,
        _coords: &RepoCoordinates,
        listener: Arc<dyn PushListener>,
    ) -> Result<(), SourceError> {
        self.listeners.lock().unwrap().push(listener);
        Ok(())
    }
}

/// Build backend producing one file per exact selector
pub struct MockBuildBackend {
    failing: HashSet<String>,
    template_body: Vec<u8>,
}

impl MockBuildBackend {
    pub fn all_succeed() -> Self {
        Self {
            failing: HashSet::new(),
            template_body: br#"{"resources": {"service": "widget"}}"#.to_vec(),
        }
    }

    pub fn failing_project(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_template_body(mut self, body: &[u8]) -> Self {
        self.template_body = body.to_vec();
        self
    }
}

#[async_trait]
impl BuildBackend for MockBuildBackend {
    async fn run(
        &self,
        project: &BuildProject,
        _input: &ArtifactBundle,
    ) -> Result<ArtifactBundle, BuildError> {
        if self.failing.contains(&project.name) {
            return Err(BuildError::CommandFailed {
                phase: "post_build".to_string(),
                command: "npm run test".to_string(),
                exit_code: 1,
                stderr: "tests failed".to_string(),
            });
        }

        let mut bundle = ArtifactBundle::new();
        for selector in &project.spec.artifacts.files {
            if let FileSelector::Exact(name) = selector {
                let contents: Vec<u8> = if name.ends_with(".json") {
                    self.template_body.clone()
                } else {
                    b"// built output".to_vec()
                };
                bundle.insert(name, contents);
            }
        }
        Ok(bundle)
    }
}

/// Deploy backend that records requests and plays scripted outcomes
pub struct MockDeployBackend {
    pub applied: Arc<Mutex<Vec<DeployRequest>>>,
    script: Mutex<VecDeque<Result<DeployOutcome, String>>>,
}

impl MockDeployBackend {
    /// Always resolves as `Created`
    pub fn always_created() -> Self {
        Self {
            applied: Arc::new(Mutex::new(Vec::new())),
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Play the given outcomes in order; `Err` becomes an apply failure
    pub fn scripted(outcomes: Vec<Result<DeployOutcome, &str>>) -> Self {
        Self {
            applied: Arc::new(Mutex::new(Vec::new())),
            script: Mutex::new(
                outcomes
                    .into_iter()
                    .map(|o| o.map_err(|e| e.to_string()))
                    .collect(),
            ),
        }
    }

    pub fn requests(&self) -> Vec<DeployRequest> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeployBackend for MockDeployBackend {
    async fn apply(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError> {
        self.applied.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            None => Ok(DeployOutcome::Created),
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(reason)) => Err(DeployError::ApplyFailed {
                target: request.target.clone(),
                rolled_back: true,
                reason,
            }),
        }
    }
}

/// Backends where every stage succeeds
pub fn standard_backends() -> (Backends, Arc<MockDeployBackend>) {
    let deploy = Arc::new(MockDeployBackend::always_created());
    let backends = Backends::new(
        Arc::new(MockSecretStore::with(&[("ci-github-token", "tok-123")])),
        Arc::new(MockSourceProvider::default_source()),
        Arc::new(MockBuildBackend::all_succeed()),
        deploy.clone(),
    );
    (backends, deploy)
}

/// Test result from running a pipeline
#[derive(Clone)]
pub struct RunResult {
    pub pipeline: Pipeline,
    pub status: RunStatus,
    pub events: Vec<RunEvent>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RunStatus::Failed)
    }

    pub fn action_state(&self, name: &str) -> Option<ActionState> {
        self.pipeline.action(name).map(|a| a.state.clone())
    }

    /// Names of stages that emitted a StageStarted event, in order
    pub fn started_stages(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RunEvent::StageStarted { stage, .. } => Some(stage.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Run a pipeline against the given backends, recording all events
pub async fn run_pipeline_with(pipeline: &mut Pipeline, backends: Backends) -> RunResult {
    let events: Arc<Mutex<Vec<RunEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();

    let mut engine = PipelineEngine::new(backends);
    engine.add_event_handler(move |event| {
        recorded.lock().unwrap().push(event.clone());
    });

    let status = engine
        .execute(pipeline)
        .await
        .expect("engine should not abort");

    let events = events.lock().unwrap().clone();
    RunResult {
        pipeline: pipeline.clone(),
        status,
        events,
    }
}

pub fn assert_run_succeeded(result: &RunResult) {
    assert!(
        result.is_success(),
        "Expected run to succeed, got {:?}",
        result.status
    );
}

pub fn assert_run_failed(result: &RunResult) {
    assert!(
        result.is_failed(),
        "Expected run to fail, got {:?}",
        result.status
    );
}

pub fn assert_action_succeeded(result: &RunResult, name: &str) {
    match result.action_state(name) {
        Some(ActionState::Succeeded { .. }) => {}
        other => panic!("Expected action '{}' to succeed, got {:?}", name, other),
    }
}

pub fn assert_action_failed(result: &RunResult, name: &str, error_contains: &str) {
    match result.action_state(name) {
        Some(ActionState::Failed { error, .. }) => {
            assert!(
                error.contains(error_contains),
                "Expected error of '{}' to contain '{}', got '{}'",
                name,
                error_contains,
                error
            );
        }
        other => panic!("Expected action '{}' to fail, got {:?}", name, other),
    }
}

pub fn assert_action_skipped(result: &RunResult, name: &str) {
    match result.action_state(name) {
        Some(ActionState::Skipped { .. }) => {}
        other => panic!("Expected action '{}' to be skipped, got {:?}", name, other),
    }
}
