//! Test: deploy create/update/no-changes and replace-on-failure semantics

use crate::helpers::*;
use pipewright::backend::{
    Backends, DeployBackend, DeployOutcome, DeployRequest, LocalTargetEnvironment,
};
use pipewright::core::Capability;
use pipewright::execution::RunEvent;
use std::collections::BTreeMap;
use std::sync::Arc;

fn backends_with_deploy(deploy: Arc<dyn DeployBackend>) -> Backends {
    Backends::new(
        Arc::new(MockSecretStore::with(&[("ci-github-token", "tok-123")])),
        Arc::new(MockSourceProvider::default_source()),
        Arc::new(MockBuildBackend::all_succeed()),
        deploy,
    )
}

fn deploy_outcome(result: &RunResult) -> Option<DeployOutcome> {
    result.events.iter().find_map(|e| match e {
        RunEvent::ActionSucceeded {
            action,
            deploy_outcome,
            ..
        } if action == "deploy" => *deploy_outcome,
        _ => None,
    })
}

/// Scenario: a missing target is created; a later run with a changed code
/// location updates it in place, retaining the pre-update state
#[tokio::test]
async fn test_create_then_update_against_local_target() {
    let root = tempfile::tempdir().unwrap();
    let env = Arc::new(LocalTargetEnvironment::new(root.path().to_path_buf()));

    let mut pipeline = sample_pipeline();
    let first = run_pipeline_with(&mut pipeline, backends_with_deploy(env.clone())).await;
    assert_run_succeeded(&first);
    assert_eq!(deploy_outcome(&first), Some(DeployOutcome::Created));

    let first_key = format!("{}/code", first.pipeline.state.run_id);
    let state = env.current_state("widget-prod").unwrap().unwrap();
    assert_eq!(state.parameters.get("bucketKey"), Some(&first_key));

    // A second run carries a new artifact namespace, so the parameter
    // overrides differ and the target is updated in place.
    pipeline.reset_for_run();
    let second = run_pipeline_with(&mut pipeline, backends_with_deploy(env.clone())).await;
    assert_run_succeeded(&second);
    assert_eq!(deploy_outcome(&second), Some(DeployOutcome::Updated));

    let second_key = format!("{}/code", second.pipeline.state.run_id);
    let state = env.current_state("widget-prod").unwrap().unwrap();
    assert_eq!(state.parameters.get("bucketKey"), Some(&second_key));

    let previous = env.previous_state("widget-prod").unwrap().unwrap();
    assert_eq!(previous.parameters.get("bucketKey"), Some(&first_key));
}

/// Applying an identical request twice produces no changes the second time
#[tokio::test]
async fn test_identical_apply_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let env = LocalTargetEnvironment::new(root.path().to_path_buf());

    let request = DeployRequest {
        target: "widget-prod".to_string(),
        template: r#"{"resources": {"service": "widget"}}"#.to_string(),
        parameters: BTreeMap::from([
            ("bucketName".to_string(), "widget-pipeline-artifacts".to_string()),
            ("bucketKey".to_string(), "run-1/code".to_string()),
        ]),
        capabilities: vec![Capability::CreateIdentities],
        replace_on_failure: true,
    };

    assert_eq!(env.apply(&request).await.unwrap(), DeployOutcome::Created);
    assert_eq!(env.apply(&request).await.unwrap(), DeployOutcome::NoChanges);
    assert_eq!(env.apply(&request).await.unwrap(), DeployOutcome::NoChanges);
}

/// Scenario: a mid-update failure resolves as a clean replacement rather
/// than a partially applied target
#[tokio::test]
async fn test_replace_on_failure_reports_replaced() {
    let deploy = Arc::new(MockDeployBackend::scripted(vec![Ok(
        DeployOutcome::Replaced,
    )]));

    let mut pipeline = sample_pipeline();
    let result = run_pipeline_with(&mut pipeline, backends_with_deploy(deploy.clone())).await;

    assert_run_succeeded(&result);
    assert_eq!(deploy_outcome(&result), Some(DeployOutcome::Replaced));
    assert!(deploy.requests()[0].replace_on_failure);
}

/// A deploy failure that rolled back fails the run and leaves the
/// previously deployed state in place
#[tokio::test]
async fn test_rolled_back_apply_fails_the_run() {
    let deploy = Arc::new(MockDeployBackend::scripted(vec![Err(
        "update could not complete",
    )]));

    let mut pipeline = sample_pipeline();
    let result = run_pipeline_with(&mut pipeline, backends_with_deploy(deploy)).await;

    assert_run_failed(&result);
    assert_action_failed(&result, "deploy", "rolled back: true");
}

/// A template requiring an undeclared capability is rejected up front
#[tokio::test]
async fn test_undeclared_capability_fails_deploy() {
    let root = tempfile::tempdir().unwrap();
    let env = Arc::new(LocalTargetEnvironment::new(root.path().to_path_buf()));

    let deploy: Arc<dyn DeployBackend> = env.clone();
    let backends = Backends::new(
        Arc::new(MockSecretStore::with(&[("ci-github-token", "tok-123")])),
        Arc::new(MockSourceProvider::default_source()),
        Arc::new(MockBuildBackend::all_succeed().with_template_body(
            br#"{"requires": ["create-identities"], "resources": {}}"#,
        )),
        deploy,
    );

    // Strip the declared capabilities from the deploy action.
    let mut pipeline = sample_pipeline();
    if let Some(action) = pipeline.action_mut("deploy") {
        if let pipewright::core::ActionOp::Deploy(spec) = &mut action.op {
            spec.capabilities.clear();
        }
    }

    let result = run_pipeline_with(&mut pipeline, backends).await;

    assert_run_failed(&result);
    assert_action_failed(&result, "deploy", "create-identities");
    assert!(env.current_state("widget-prod").unwrap().is_none());
}
