//! Test: a push-triggered run walks checkout, both builds, and deploy

use crate::helpers::*;
use pipewright::core::state::ActionState;
use pipewright::execution::RunEvent;

/// Scenario: checkout succeeds, both builds succeed, deploy applies the
/// template with the code artifact's live location substituted in
#[tokio::test]
async fn test_full_run_succeeds() {
    let mut pipeline = sample_pipeline();
    let (backends, deploy) = standard_backends();

    let result = run_pipeline_with(&mut pipeline, backends).await;

    assert_run_succeeded(&result);
    assert_action_succeeded(&result, "checkout");
    assert_action_succeeded(&result, "build-template");
    assert_action_succeeded(&result, "build-code");
    assert_action_succeeded(&result, "deploy");

    // Stages ran strictly in order.
    assert_eq!(
        result.started_stages(),
        vec!["Source".to_string(), "Build".to_string(), "Deploy".to_string()]
    );

    // The deploy saw exactly one apply, carrying the code artifact's
    // run-namespaced location as parameter overrides.
    let requests = deploy.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.target, "widget-prod");
    assert_eq!(
        request.parameters.get("bucketName"),
        Some(&"widget-pipeline-artifacts".to_string())
    );
    assert_eq!(
        request.parameters.get("bucketKey"),
        Some(&format!("{}/code", result.pipeline.state.run_id))
    );
    assert!(request.replace_on_failure);
    assert_eq!(request.capabilities.len(), 2);

    // The template body flowed from the build output into the request.
    assert!(request.template.contains("resources"));
}

/// Exactly one checkout action exists and is ordered first
#[tokio::test]
async fn test_checkout_is_single_and_first() {
    let pipeline = sample_pipeline();

    let checkout_count = pipeline
        .stages
        .iter()
        .flat_map(|s| &s.actions)
        .filter(|a| a.is_checkout())
        .count();
    assert_eq!(checkout_count, 1);
    assert!(pipeline.stages[0].actions[0].is_checkout());
}

/// Build outputs land in the run's artifact namespace, never another's
#[tokio::test]
async fn test_artifact_namespace_is_run_scoped() {
    let (backends_a, deploy_a) = standard_backends();
    let (backends_b, deploy_b) = standard_backends();

    let mut first = sample_pipeline();
    let mut second = sample_pipeline();

    run_pipeline_with(&mut first, backends_a).await;
    run_pipeline_with(&mut second, backends_b).await;

    let key_a = deploy_a.requests()[0].parameters["bucketKey"].clone();
    let key_b = deploy_b.requests()[0].parameters["bucketKey"].clone();
    assert_ne!(key_a, key_b);
    assert!(key_a.starts_with(&first.state.run_id.to_string()));
    assert!(key_b.starts_with(&second.state.run_id.to_string()));
}

/// Action events carry the deploy outcome for observers
#[tokio::test]
async fn test_deploy_outcome_is_reported() {
    let mut pipeline = sample_pipeline();
    let (backends, _deploy) = standard_backends();

    let result = run_pipeline_with(&mut pipeline, backends).await;

    let reported = result.events.iter().any(|e| {
        matches!(
            e,
            RunEvent::ActionSucceeded {
                action,
                deploy_outcome: Some(_),
                ..
            } if action == "deploy"
        )
    });
    assert!(reported, "deploy outcome should be present in events");

    match result.action_state("deploy") {
        Some(ActionState::Succeeded { outputs, .. }) => assert!(outputs.is_empty()),
        other => panic!("Expected deploy success, got {:?}", other),
    }
}
