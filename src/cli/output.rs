//! CLI output formatting

use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::core::state::{ActionState, RunStatus};
use crate::execution::engine::RunEvent;
use crate::persistence::RunSummary;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over a run's actions
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format an action state for display
pub fn format_action_state(state: &ActionState) -> String {
    match state {
        ActionState::Pending => style("PENDING").dim().to_string(),
        ActionState::Running { .. } => style("RUNNING").yellow().to_string(),
        ActionState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        ActionState::Failed { .. } => style("FAILED").red().to_string(),
        ActionState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Idle => style("IDLE").dim().to_string(),
        RunStatus::SourcePending => style("SOURCE").yellow().to_string(),
        RunStatus::Building => style("BUILDING").yellow().to_string(),
        RunStatus::Deploying => style("DEPLOYING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a run event as a console line
pub fn format_run_event(event: &RunEvent) -> String {
    match event {
        RunEvent::RunStarted {
            run_id,
            pipeline_name,
        } => format!(
            "{} Run {} of {} started",
            ROCKET,
            style(&run_id.to_string()[..8]).dim(),
            style(pipeline_name).bold()
        ),
        RunEvent::StageStarted { stage, .. } => {
            format!("{} Stage {} started", SPINNER, style(stage).bold())
        }
        RunEvent::ActionStarted { action, .. } => {
            format!("  {} {}", SPINNER, style(action).cyan())
        }
        RunEvent::ActionSucceeded {
            action,
            outputs,
            deploy_outcome,
            ..
        } => {
            let mut line = format!("  {} {}", CHECK, style(action).cyan());
            if !outputs.is_empty() {
                line.push_str(&format!(" → {}", style(outputs.join(", ")).dim()));
            }
            if let Some(outcome) = deploy_outcome {
                line.push_str(&format!(" ({})", style(format!("{:?}", outcome)).dim()));
            }
            line
        }
        RunEvent::ActionFailed { action, error, .. } => {
            format!(
                "  {} {}: {}",
                CROSS,
                style(action).cyan(),
                style(error).red()
            )
        }
        RunEvent::StageSucceeded { stage } => {
            format!("{} Stage {} succeeded", CHECK, style(stage).bold())
        }
        RunEvent::StageFailed { stage } => {
            format!("{} Stage {} failed", CROSS, style(stage).bold())
        }
        RunEvent::RunFinished { status, .. } => {
            format!("{} Run finished: {}", INFO, format_status(*status))
        }
    }
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Idle => INFO,
        _ => SPINNER,
    };

    format!(
        "{} {} - {} - {} ({}/{}) - {}",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.completed_actions,
        summary.total_actions,
        style(format!("{:.0}%", summary.progress * 100.0)).cyan()
    )
}
