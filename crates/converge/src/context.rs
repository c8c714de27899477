//! Executor collaborators: confirmation, progress reporting and time
//!
//! These traits let the executor run without a terminal or real timers.
//! The binary wires in an interactive prompt and the system clock; tests use
//! [`AutoConfirm`] and [`ManualClock`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::model::{ActionKind, ActionResult, PlanAction};

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the operator to confirm a plan
    ///
    /// `Ok(false)` is a refusal. `Err` means the prompt itself could not run;
    /// the executor treats that as a refusal too.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// One observed status of a long-running remote task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub node: String,
    /// Remote task id
    pub upid: String,
    pub operation: ActionKind,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Progress callback for execution
pub trait ProgressCallback {
    /// Called before an action is dispatched (or skipped in dry-run)
    fn on_action_start(&mut self, index: usize, total: usize, action: &PlanAction);

    /// Called when an action has a result
    fn on_action_complete(&mut self, result: &ActionResult);

    /// Called on every status transition of a polled task
    fn on_task_update(&mut self, progress: &TaskProgress);

    /// Called before each compensation of the rollback pass
    fn on_rollback_start(&mut self, _action: &PlanAction) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_action_start(&mut self, _index: usize, _total: usize, _action: &PlanAction) {}
    fn on_action_complete(&mut self, _result: &ActionResult) {}
    fn on_task_update(&mut self, _progress: &TaskProgress) {}
}

/// Source of time for timestamps and task polling
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&mut self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only advances when slept on
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: DateTime<Utc>,
    sleeps: usize,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: start, sleeps: 0 }
    }

    /// Number of `sleep` calls so far
    pub fn sleeps(&self) -> usize {
        self.sleeps
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps += 1;
        self.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_callbacks() {
        assert!(AutoConfirm.confirm("apply?").unwrap());
        assert!(!AutoDecline.confirm("apply?").unwrap());
    }

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let start = Utc::now();
        let mut clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.sleep(Duration::from_secs(5));
        clock.sleep(Duration::from_secs(5));

        assert_eq!(clock.sleeps(), 2);
        assert_eq!(clock.now() - start, chrono::Duration::seconds(10));
    }
}
