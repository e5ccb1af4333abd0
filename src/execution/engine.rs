//! Run engine - drives a pipeline through its stages

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::{Backends, DeployOutcome};
use crate::core::artifact::ArtifactStore;
use crate::core::pipeline::Pipeline;
use crate::core::stage::StageKind;
use crate::core::state::{ActionState, RunStatus};
use crate::execution::executor::{ActionExecutor, RunContext};

/// Events emitted while a run executes
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
    },
    StageStarted {
        stage: String,
        kind: StageKind,
    },
    ActionStarted {
        stage: String,
        action: String,
    },
    ActionSucceeded {
        stage: String,
        action: String,
        outputs: Vec<String>,
        deploy_outcome: Option<DeployOutcome>,
    },
    ActionFailed {
        stage: String,
        action: String,
        error: String,
    },
    StageSucceeded {
        stage: String,
    },
    StageFailed {
        stage: String,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&RunEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("action task aborted: {0}")]
    Join(String),
}

/// Drives one pipeline run through its stages
///
/// Stages execute strictly in order; the actions of a stage run
/// concurrently and are all joined before the stage resolves. Any action
/// failure fails the stage and the run, and later stages never start.
pub struct PipelineEngine {
    executor: ActionExecutor,
    handlers: Vec<EventHandler>,
}

impl PipelineEngine {
    pub fn new(backends: Backends) -> Self {
        Self {
            executor: ActionExecutor::new(backends),
            handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    fn emit(&self, event: RunEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    /// Execute the pipeline once and return the final run status
    pub async fn execute(&self, pipeline: &mut Pipeline) -> Result<RunStatus, EngineError> {
        let run_id = pipeline.state.run_id;
        info!("Starting run {} of pipeline '{}'", run_id, pipeline.name);

        pipeline.state.start(pipeline.total_actions());
        self.emit(RunEvent::RunStarted {
            run_id,
            pipeline_name: pipeline.name.clone(),
        });

        let context = RunContext {
            role: Arc::new(pipeline.role.clone()),
            store: Arc::new(Mutex::new(ArtifactStore::new(
                pipeline.bucket.clone(),
                pipeline.key.clone(),
                run_id,
            ))),
        };

        let mut run_failed = false;

        for stage_index in 0..pipeline.stages.len() {
            let stage_name = pipeline.stages[stage_index].name.clone();
            let stage_kind = pipeline.stages[stage_index].kind;

            if run_failed {
                // A failed stage halts the run; everything downstream is
                // recorded as skipped, never partially deployed.
                let reason = "earlier stage failed".to_string();
                for action in &mut pipeline.stages[stage_index].actions {
                    action.state = ActionState::Skipped {
                        reason: reason.clone(),
                    };
                }
                continue;
            }

            pipeline.state.enter_stage(stage_kind);
            self.emit(RunEvent::StageStarted {
                stage: stage_name.clone(),
                kind: stage_kind,
            });

            let stage_ok = self
                .execute_stage(pipeline, stage_index, &stage_name, &context)
                .await?;

            if stage_ok {
                self.emit(RunEvent::StageSucceeded {
                    stage: stage_name.clone(),
                });
            } else {
                warn!("Stage '{}' failed, halting run {}", stage_name, run_id);
                self.emit(RunEvent::StageFailed {
                    stage: stage_name.clone(),
                });
                run_failed = true;
            }
        }

        let status = if run_failed {
            pipeline.state.fail();
            RunStatus::Failed
        } else {
            pipeline.state.succeed();
            RunStatus::Succeeded
        };

        info!("Run {} finished: {:?}", run_id, status);
        self.emit(RunEvent::RunFinished { run_id, status });

        Ok(status)
    }

    /// Run every action of one stage concurrently; true when all succeed
    async fn execute_stage(
        &self,
        pipeline: &mut Pipeline,
        stage_index: usize,
        stage_name: &str,
        context: &RunContext,
    ) -> Result<bool, EngineError> {
        let actions = pipeline.stages[stage_index].actions.clone();
        let mut tasks = JoinSet::new();

        for action in actions {
            let started_at = Utc::now();
            if let Some(a) = pipeline.action_mut(&action.name) {
                a.state = ActionState::Running { started_at };
            }
            self.emit(RunEvent::ActionStarted {
                stage: stage_name.to_string(),
                action: action.name.clone(),
            });

            let executor = self.executor.clone();
            let context = context.clone();
            tasks.spawn(async move {
                let result = executor.execute(&action, &context).await;
                (action.name, started_at, result)
            });
        }

        let mut all_succeeded = true;
        while let Some(joined) = tasks.join_next().await {
            let (name, started_at, result) = joined.map_err(|e| EngineError::Join(e.to_string()))?;
            match result {
                Ok(report) => {
                    pipeline.state.completed_actions += 1;
                    if let Some(a) = pipeline.action_mut(&name) {
                        a.state = ActionState::Succeeded {
                            outputs: report.outputs.clone(),
                            started_at,
                            finished_at: Utc::now(),
                        };
                    }
                    self.emit(RunEvent::ActionSucceeded {
                        stage: stage_name.to_string(),
                        action: name,
                        outputs: report.outputs,
                        deploy_outcome: report.deploy_outcome,
                    });
                }
                Err(err) => {
                    error!("Action '{}' failed: {}", name, err);
                    all_succeeded = false;
                    pipeline.state.failed_actions += 1;
                    let message = err.to_string();
                    if let Some(a) = pipeline.action_mut(&name) {
                        a.state = ActionState::Failed {
                            error: message.clone(),
                            started_at,
                            failed_at: Utc::now(),
                        };
                    }
                    self.emit(RunEvent::ActionFailed {
                        stage: stage_name.to_string(),
                        action: name,
                        error: message,
                    });
                }
            }
        }

        Ok(all_succeeded)
    }
}
