//! Polling of long-running hypervisor tasks

use serde_json::{Value, json};

use super::ExecuteOptions;
use crate::context::{Clock, ProgressCallback, TaskProgress};
use crate::model::ActionKind;
use crate::provider::{HypervisorProvider, ProviderError, ProviderResult, TaskHandle, TaskStatus};

/// Poll `handle` until it stops or `opts.task_timeout` elapses
///
/// Every change of `(status, exit_status)` is reported once through
/// `progress`. A status query that fails ends the wait with that error.
pub(super) fn wait_for_task<P: ProgressCallback, K: Clock>(
    provider: &mut dyn HypervisorProvider,
    handle: &TaskHandle,
    operation: ActionKind,
    opts: &ExecuteOptions,
    progress: &mut P,
    clock: &mut K,
) -> ProviderResult<Option<Value>> {
    let started = clock.now();
    let mut last: Option<TaskStatus> = None;

    loop {
        let status = provider.task_status(handle)?;

        if last.as_ref() != Some(&status) {
            log::debug!(
                "Task {} on {}: {}{}",
                handle.upid,
                handle.node,
                status.status,
                status
                    .exit_status
                    .as_deref()
                    .map(|s| format!(" ({s})"))
                    .unwrap_or_default()
            );
            progress.on_task_update(&TaskProgress {
                node: handle.node.clone(),
                upid: handle.upid.clone(),
                operation,
                status: status.status.clone(),
                detail: status.exit_status.clone(),
            });
            last = Some(status.clone());
        }

        if !status.is_running() {
            if status.is_success() {
                return Ok(Some(json!({
                    "node": handle.node,
                    "upid": handle.upid,
                    "exitstatus": "OK",
                })));
            }
            return Err(ProviderError::TaskFailed {
                node: handle.node.clone(),
                upid: handle.upid.clone(),
                exit_status: status.exit_status.unwrap_or(status.status),
            });
        }

        let elapsed = (clock.now() - started).to_std().unwrap_or_default();
        if elapsed >= opts.task_timeout {
            return Err(ProviderError::TaskTimeout {
                node: handle.node.clone(),
                upid: handle.upid.clone(),
                secs: opts.task_timeout.as_secs(),
            });
        }

        clock.sleep(opts.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ManualClock, NoProgress};
    use crate::model::{ActionResult, PlanAction};
    use crate::policy::CrudRequest;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::time::Duration;

    struct Statuses(VecDeque<TaskStatus>);

    impl HypervisorProvider for Statuses {
        fn request(&mut self, _request: &CrudRequest) -> ProviderResult<Value> {
            Ok(Value::Null)
        }

        fn task_status(&mut self, _task: &TaskHandle) -> ProviderResult<TaskStatus> {
            Ok(self.0.pop_front().unwrap_or_else(TaskStatus::running))
        }
    }

    #[derive(Default)]
    struct Updates(Vec<TaskProgress>);

    impl ProgressCallback for Updates {
        fn on_action_start(&mut self, _index: usize, _total: usize, _action: &PlanAction) {}
        fn on_action_complete(&mut self, _result: &ActionResult) {}
        fn on_task_update(&mut self, progress: &TaskProgress) {
            self.0.push(progress.clone());
        }
    }

    fn handle() -> TaskHandle {
        TaskHandle {
            node: "pve1".to_string(),
            upid: "UPID:pve1:0001".to_string(),
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_transitions_reported_once() {
        let mut provider = Statuses(VecDeque::from([
            TaskStatus::running(),
            TaskStatus::running(),
            TaskStatus::running(),
            TaskStatus::stopped("OK"),
        ]));
        let mut updates = Updates::default();
        let mut clock = clock();

        let out = wait_for_task(
            &mut provider,
            &handle(),
            ActionKind::MigrateGuest,
            &ExecuteOptions::default(),
            &mut updates,
            &mut clock,
        )
        .unwrap();

        assert_eq!(out.unwrap()["exitstatus"], "OK");
        assert_eq!(clock.sleeps(), 3);
        let statuses: Vec<_> = updates.0.iter().map(|u| u.status.as_str()).collect();
        assert_eq!(statuses, vec!["running", "stopped"]);
        assert_eq!(updates.0[1].detail.as_deref(), Some("OK"));
        assert_eq!(updates.0[0].operation, ActionKind::MigrateGuest);
    }

    #[test]
    fn test_failed_exit_status() {
        let mut provider = Statuses(VecDeque::from([TaskStatus::stopped(
            "command 'zpool create' failed: exit code 1",
        )]));
        let err = wait_for_task(
            &mut provider,
            &handle(),
            ActionKind::CreateStoragePool,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut clock(),
        )
        .unwrap_err();

        assert!(matches!(err, ProviderError::TaskFailed { ref exit_status, .. } if exit_status.contains("zpool")));
    }

    #[test]
    fn test_timeout_after_configured_wait() {
        let mut provider = Statuses(VecDeque::new());
        let opts = ExecuteOptions {
            poll_interval: Duration::from_secs(1),
            task_timeout: Duration::from_secs(5),
            ..ExecuteOptions::default()
        };
        let mut clock = clock();

        let err = wait_for_task(
            &mut provider,
            &handle(),
            ActionKind::BackupGuest,
            &opts,
            &mut NoProgress,
            &mut clock,
        )
        .unwrap_err();

        assert_eq!(
            err,
            ProviderError::TaskTimeout {
                node: "pve1".to_string(),
                upid: "UPID:pve1:0001".to_string(),
                secs: 5
            }
        );
        assert_eq!(clock.sleeps(), 5);
    }
}
