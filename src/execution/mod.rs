//! Pipeline execution

pub mod engine;
pub mod executor;
pub mod trigger;

pub use engine::{EngineError, EventHandler, PipelineEngine, RunEvent};
pub use executor::{ActionError, ActionExecutor, ActionReport, RunContext};
pub use trigger::{Trigger, TriggerDisposition, TriggerQueue};
