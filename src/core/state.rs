//! Run and action state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::stage::StageKind;

/// Overall status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// No run in progress
    Idle,
    /// Source stage is executing (waiting on checkout)
    SourcePending,
    /// Build stage is executing
    Building,
    /// Deploy stage is executing
    Deploying,
    /// Run finished with every stage succeeding
    Succeeded,
    /// Run failed; later stages were never started
    Failed,
}

impl RunStatus {
    /// Whether the run has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    /// The in-flight status for a given stage kind
    pub fn for_stage(kind: StageKind) -> Self {
        match kind {
            StageKind::Source => RunStatus::SourcePending,
            StageKind::Build => RunStatus::Building,
            StageKind::Deploy => RunStatus::Deploying,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::SourcePending => "source-pending",
            RunStatus::Building => "building",
            RunStatus::Deploying => "deploying",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(RunStatus::Idle),
            "source-pending" => Some(RunStatus::SourcePending),
            "building" => Some(RunStatus::Building),
            "deploying" => Some(RunStatus::Deploying),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// State of a single action within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionState {
    /// Action has not started
    Pending,
    /// Action is currently executing
    Running { started_at: DateTime<Utc> },
    /// Action finished and its outputs were handed to the artifact store
    Succeeded {
        outputs: Vec<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Action failed; the stage and the run fail with it
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Action never ran because an earlier stage failed
    Skipped { reason: String },
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Succeeded { .. } | ActionState::Failed { .. } | ActionState::Skipped { .. }
        )
    }
}

/// Bookkeeping for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID; also namespaces the run's artifacts
    pub run_id: Uuid,

    /// Current status
    pub status: RunStatus,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// Total number of actions across all stages
    pub total_actions: usize,

    /// Number of actions that succeeded
    pub completed_actions: usize,

    /// Number of actions that failed
    pub failed_actions: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Idle,
            started_at: None,
            finished_at: None,
            total_actions: 0,
            completed_actions: 0,
            failed_actions: 0,
        }
    }

    /// Mark the run as started
    pub fn start(&mut self, total_actions: usize) {
        self.started_at = Some(Utc::now());
        self.total_actions = total_actions;
    }

    /// Enter the in-flight status for a stage
    pub fn enter_stage(&mut self, kind: StageKind) {
        self.status = RunStatus::for_stage(kind);
    }

    /// Mark the run as succeeded
    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run as failed
    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Fraction of actions that reached a terminal state (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_actions == 0 {
            return 0.0;
        }
        (self.completed_actions + self.failed_actions) as f64 / self.total_actions as f64
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
