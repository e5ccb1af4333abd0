//! Test: a failing build halts the run before deploy

use crate::helpers::*;
use pipewright::backend::Backends;
use std::sync::Arc;

fn backends_with_failing_build(project: &str) -> (Backends, Arc<MockDeployBackend>) {
    let deploy = Arc::new(MockDeployBackend::always_created());
    let backends = Backends::new(
        Arc::new(MockSecretStore::with(&[("ci-github-token", "tok-123")])),
        Arc::new(MockSourceProvider::default_source()),
        Arc::new(MockBuildBackend::all_succeed().failing_project(project)),
        deploy.clone(),
    );
    (backends, deploy)
}

/// Scenario: one build action fails, the stage is marked failed, and the
/// deploy is never invoked
#[tokio::test]
async fn test_one_build_failure_fails_the_stage() {
    let mut pipeline = sample_pipeline();
    let (backends, deploy) = backends_with_failing_build("build-code");

    let result = run_pipeline_with(&mut pipeline, backends).await;

    assert_run_failed(&result);
    assert_action_failed(&result, "build-code", "tests failed");

    // Deploy never started; the previous deployment is untouched.
    assert!(deploy.requests().is_empty());
    assert_action_skipped(&result, "deploy");
    assert_eq!(
        result.started_stages(),
        vec!["Source".to_string(), "Build".to_string()]
    );
}

/// The independent sibling build still completes when one build fails
#[tokio::test]
async fn test_sibling_build_still_completes() {
    let mut pipeline = sample_pipeline();
    let (backends, _deploy) = backends_with_failing_build("build-code");

    let result = run_pipeline_with(&mut pipeline, backends).await;

    assert_action_succeeded(&result, "build-template");
    assert_action_failed(&result, "build-code", "tests failed");
}

/// Both builds failing reports both errors and still a single failed stage
#[tokio::test]
async fn test_both_builds_failing() {
    let mut pipeline = sample_pipeline();
    let deploy = Arc::new(MockDeployBackend::always_created());
    let backends = Backends::new(
        Arc::new(MockSecretStore::with(&[("ci-github-token", "tok-123")])),
        Arc::new(MockSourceProvider::default_source()),
        Arc::new(
            MockBuildBackend::all_succeed()
                .failing_project("build-template")
                .failing_project("build-code"),
        ),
        deploy.clone(),
    );

    let result = run_pipeline_with(&mut pipeline, backends).await;

    assert_run_failed(&result);
    assert_action_failed(&result, "build-template", "tests failed");
    assert_action_failed(&result, "build-code", "tests failed");
    assert!(deploy.requests().is_empty());
    assert_eq!(result.pipeline.state.failed_actions, 2);
}
