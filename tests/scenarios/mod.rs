//! Scenario-based tests for pipewright

mod build_failure;
mod deploy_behavior;
mod full_run;
mod secret_resolution;
mod trigger_policy;
