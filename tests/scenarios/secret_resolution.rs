//! Test: an unresolvable credential fails the run at the source stage

use crate::helpers::*;
use pipewright::backend::Backends;
use pipewright::core::RunStatus;
use std::sync::Arc;

/// Scenario: the secret store cannot resolve the configured credential;
/// the checkout fails before any artifact is produced
#[tokio::test]
async fn test_missing_secret_fails_at_source() {
    let mut pipeline = sample_pipeline();

    let deploy = Arc::new(MockDeployBackend::always_created());
    let backends = Backends::new(
        Arc::new(MockSecretStore::empty()),
        Arc::new(MockSourceProvider::default_source()),
        Arc::new(MockBuildBackend::all_succeed()),
        deploy.clone(),
    );

    let result = run_pipeline_with(&mut pipeline, backends).await;

    assert_run_failed(&result);
    assert_action_failed(&result, "checkout", "ci-github-token");

    // Nothing downstream ever ran.
    assert_action_skipped(&result, "build-template");
    assert_action_skipped(&result, "build-code");
    assert_action_skipped(&result, "deploy");
    assert!(deploy.requests().is_empty());
    assert_eq!(result.started_stages(), vec!["Source".to_string()]);
}

/// An action whose role grant is missing fails as access denied
#[tokio::test]
async fn test_ungranted_secret_is_access_denied() {
    let mut pipeline = sample_pipeline();

    // Point the checkout at a secret the role was never granted.
    if let Some(action) = pipeline.action_mut("checkout") {
        if let pipewright::core::ActionOp::Checkout(spec) = &mut action.op {
            spec.token_secret = pipewright::core::stage::SecretRef::new("other-token");
        }
    }

    let deploy = Arc::new(MockDeployBackend::always_created());
    let backends = Backends::new(
        Arc::new(MockSecretStore::with(&[("other-token", "tok-999")])),
        Arc::new(MockSourceProvider::default_source()),
        Arc::new(MockBuildBackend::all_succeed()),
        deploy,
    );

    let result = run_pipeline_with(&mut pipeline, backends).await;

    assert_run_failed(&result);
    assert_action_failed(&result, "checkout", "not granted");
    assert_eq!(result.status, RunStatus::Failed);
}
