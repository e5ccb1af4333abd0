//! Test: trigger coalescing while a run is in flight

use crate::helpers::*;
use pipewright::backend::SourceProvider;
use pipewright::core::TriggerPolicy;
use pipewright::execution::{Trigger, TriggerDisposition, TriggerQueue};
use std::sync::Arc;

/// Pushes arriving while a run is in flight queue one pending run
#[tokio::test]
async fn test_pushes_coalesce_through_the_queue() {
    let provider = MockSourceProvider::default_source();
    let queue = Arc::new(TriggerQueue::new(TriggerPolicy::QueueOne));

    let coords = pipewright::backend::RepoCoordinates {
        owner: "acme".to_string(),
        repo: "widget-service".to_string(),
        branch: "main".to_string(),
    };
    provider.subscribe_pushes(&coords, queue.clone()).unwrap();

    // First push starts a run; two more land while it is in flight.
    provider.emit_push("commit-1");
    assert!(queue.is_busy());
    provider.emit_push("commit-2");
    provider.emit_push("commit-3");

    // Exactly one pending run survives, and it is the earliest queued one.
    let next = queue.finish();
    assert_eq!(
        next,
        Some(Trigger::Push {
            commit: "commit-2".to_string()
        })
    );
    assert_eq!(queue.finish(), None);
    assert!(!queue.is_busy());
}

/// Supersede keeps only the newest pending trigger
#[test]
fn test_supersede_keeps_newest() {
    let queue = TriggerQueue::new(TriggerPolicy::Supersede);
    assert_eq!(queue.offer(Trigger::Manual), TriggerDisposition::Started);

    queue.offer(Trigger::Push {
        commit: "old".to_string(),
    });
    let disposition = queue.offer(Trigger::Push {
        commit: "new".to_string(),
    });
    assert_eq!(disposition, TriggerDisposition::Replaced);

    assert_eq!(
        queue.finish(),
        Some(Trigger::Push {
            commit: "new".to_string()
        })
    );
}

/// DropNew ignores triggers entirely while busy
#[test]
fn test_drop_new_ignores_overlap() {
    let queue = TriggerQueue::new(TriggerPolicy::DropNew);
    assert_eq!(queue.offer(Trigger::Manual), TriggerDisposition::Started);
    assert_eq!(
        queue.offer(Trigger::Push {
            commit: "x".to_string()
        }),
        TriggerDisposition::Dropped
    );
    assert_eq!(queue.finish(), None);
}

/// The configured policy flows from YAML into the pipeline definition
#[test]
fn test_policy_comes_from_config() {
    let pipeline = sample_pipeline();
    assert_eq!(pipeline.trigger_policy, TriggerPolicy::QueueOne);

    let yaml = format!("{}\ntrigger_policy: drop-new\n", sample_config_yaml());
    let pipeline = pipewright::core::config::PipelineConfig::from_yaml(&yaml)
        .unwrap()
        .to_pipeline()
        .unwrap();
    assert_eq!(pipeline.trigger_policy, TriggerPolicy::DropNew);
}
