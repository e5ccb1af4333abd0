//! Trigger handling - what starts a run, and what happens to overlap

use std::sync::Mutex;
use tracing::{debug, info};

use crate::backend::source::{PushEvent, PushListener};
use crate::core::pipeline::TriggerPolicy;

/// What started (or wants to start) a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A push to the watched branch
    Push { commit: String },
    /// An operator-initiated run
    Manual,
}

/// How the queue handled an offered trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDisposition {
    /// Nothing was in flight; the caller should start this run now
    Started,
    /// A run is in flight; this trigger waits in the pending slot
    Queued,
    /// This trigger replaced the previously pending one
    Replaced,
    /// This trigger was dropped per policy
    Dropped,
}

#[derive(Debug, Default)]
struct QueueState {
    in_flight: bool,
    pending: Option<Trigger>,
}

/// Coalesces triggers arriving while a run is in flight
///
/// At most one run is pending behind the in-flight one; the configured
/// policy decides whether a newer trigger queues, replaces the pending
/// trigger, or is dropped.
#[derive(Debug)]
pub struct TriggerQueue {
    policy: TriggerPolicy,
    state: Mutex<QueueState>,
}

impl TriggerQueue {
    pub fn new(policy: TriggerPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Offer a trigger; `Started` means the caller owns running it now
    pub fn offer(&self, trigger: Trigger) -> TriggerDisposition {
        let mut state = self.state.lock().unwrap();

        if !state.in_flight {
            state.in_flight = true;
            debug!("Trigger accepted, starting run: {:?}", trigger);
            return TriggerDisposition::Started;
        }

        match self.policy {
            TriggerPolicy::QueueOne => {
                if state.pending.is_none() {
                    state.pending = Some(trigger);
                    TriggerDisposition::Queued
                } else {
                    TriggerDisposition::Dropped
                }
            }
            TriggerPolicy::Supersede => {
                let had_pending = state.pending.is_some();
                state.pending = Some(trigger);
                if had_pending {
                    TriggerDisposition::Replaced
                } else {
                    TriggerDisposition::Queued
                }
            }
            TriggerPolicy::DropNew => TriggerDisposition::Dropped,
        }
    }

    /// Mark the in-flight run finished; returns the pending trigger, if
    /// any, which the caller should run next (the queue keeps it counted
    /// as in flight)
    pub fn finish(&self) -> Option<Trigger> {
        let mut state = self.state.lock().unwrap();
        match state.pending.take() {
            Some(next) => {
                info!("Starting queued run: {:?}", next);
                Some(next)
            }
            None => {
                state.in_flight = false;
                None
            }
        }
    }

    /// Whether a run is currently in flight
    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap().in_flight
    }
}

impl PushListener for TriggerQueue {
    fn on_push(&self, event: PushEvent) {
        let disposition = self.offer(Trigger::Push {
            commit: event.commit,
        });
        debug!("Push to {} handled as {:?}", event.coords.branch, disposition);
    }
}
