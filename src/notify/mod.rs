//! Build event notifications
//!
//! Optional fan-out of build success/failure events to a topic with email
//! subscribers. Wired only when the pipeline configuration carries a
//! `notifications` section; absent configuration means the subsystem does
//! not exist at run time.

use std::sync::Arc;
use tracing::info;

use crate::core::pipeline::Pipeline;
use crate::core::role::{Grantable, PermissionKind};
use crate::execution::engine::RunEvent;

/// Reference to a topic, as a grant target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRef {
    pub name: String,
}

impl TopicRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Grantable for TopicRef {
    fn resource_id(&self) -> String {
        format!("topic/{}", self.name)
    }

    fn supported_permissions(&self) -> &'static [PermissionKind] {
        &[PermissionKind::Publish]
    }
}

/// A topic and its subscribers
#[derive(Debug, Clone)]
pub struct Topic {
    pub name: String,
    pub subscribers: Vec<String>,
}

/// Build events a rule can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEventKind {
    BuildSucceeded,
    BuildFailed,
}

/// A notification ready for fan-out
#[derive(Debug, Clone)]
pub struct Notification {
    pub topic: String,
    pub project: String,
    pub kind: BuildEventKind,
}

/// Trait for notification sinks
pub trait NotificationSink: Send + Sync {
    fn publish(&self, topic: &Topic, notification: Notification);
}

/// Sink that records the fan-out in the log
///
/// Stands in for a real delivery service during local runs.
pub struct LoggingSink;

impl NotificationSink for LoggingSink {
    fn publish(&self, topic: &Topic, notification: Notification) {
        info!(
            "Notification on '{}': {:?} for project '{}' (subscribers: {})",
            topic.name,
            notification.kind,
            notification.project,
            topic.subscribers.len()
        );
    }
}

/// One subscription: a build project and the events it reports
#[derive(Debug, Clone)]
pub struct NotificationRule {
    pub project: String,
    pub events: Vec<BuildEventKind>,
}

/// All notification rules of a pipeline, bound to a sink
pub struct NotificationRules {
    topic: Topic,
    rules: Vec<NotificationRule>,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationRules {
    /// Build the rules for a pipeline; `None` when notifications are not
    /// configured
    pub fn for_pipeline(pipeline: &Pipeline, sink: Arc<dyn NotificationSink>) -> Option<Self> {
        let config = pipeline.notifications.as_ref()?;

        let build_stage = pipeline.stage("Build")?;
        let rules = build_stage
            .actions
            .iter()
            .map(|action| NotificationRule {
                project: action.name.clone(),
                events: vec![BuildEventKind::BuildSucceeded, BuildEventKind::BuildFailed],
            })
            .collect();

        Some(Self {
            topic: Topic {
                name: config.topic.clone(),
                subscribers: config.emails.clone(),
            },
            rules,
            sink,
        })
    }

    /// An event handler to register with the engine
    pub fn into_handler(self) -> impl Fn(&RunEvent) + Send + Sync {
        move |event| self.handle(event)
    }

    fn handle(&self, event: &RunEvent) {
        let (stage, action, kind) = match event {
            RunEvent::ActionSucceeded { stage, action, .. } => {
                (stage, action, BuildEventKind::BuildSucceeded)
            }
            RunEvent::ActionFailed { stage, action, .. } => {
                (stage, action, BuildEventKind::BuildFailed)
            }
            _ => return,
        };

        if stage != "Build" {
            return;
        }

        let subscribed = self
            .rules
            .iter()
            .any(|r| &r.project == action && r.events.contains(&kind));
        if subscribed {
            self.sink.publish(
                &self.topic,
                Notification {
                    topic: self.topic.name.clone(),
                    project: action.clone(),
                    kind,
                },
            );
        }
    }
}
