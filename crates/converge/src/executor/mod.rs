//! Executor: runs a plan against the providers, rolling back on failure
//!
//! ```text
//! AwaitingConfirmation → Executing → Completed
//!                                  → Failed → RollingBack → RolledBack
//! ```
//!
//! Actions run one at a time in plan order. The first failure halts the
//! forward pass; every completed action with a compensation is then undone in
//! reverse completion order. A failed action is data in the [`ApplyResult`];
//! only a missing provider is returned as [`Error`](crate::Error). A prompt
//! that fails to run counts as a refusal.

mod compensate;
mod dispatch;
mod tasks;

use std::time::Duration;

use serde_json::Value;

use crate::Result;
use crate::audit::{self, AUDIT_TARGET};
use crate::context::{Clock, ConfirmCallback, ProgressCallback};
use crate::model::{ActionResult, ApplyResult, Plan, PlanAction, RollbackReport};
use crate::provider::Providers;
use crate::redact::Redactor;

use compensate::compensation;
use dispatch::{dispatch, missing_provider};

/// Interval between two status queries of a remote task
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest wait for a remote task before the action fails
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Options for one executor run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Record every action as skipped without calling a provider
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    pub poll_interval: Duration,
    pub task_timeout: Duration,
    /// Literal values scrubbed from messages and outputs
    pub secrets: Vec<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            yes: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            secrets: Vec::new(),
        }
    }
}

/// Execute a plan
///
/// # Type Parameters
/// * `C` - Confirm callback type
/// * `P` - Progress callback type
/// * `K` - Clock used for timestamps and task polling
///
/// # Arguments
/// * `plan` - The plan to run
/// * `providers` - One client per backend the plan touches
/// * `opts` - Execution options (dry_run, yes, polling, secrets)
/// * `confirm` - Asked once before the first action unless `yes` or `dry_run`
/// * `progress` - Progress callback
/// * `clock` - Time source
///
/// # Returns
/// The per-action results and, after a failure, the rollback report
pub fn execute_plan<C, P, K>(
    plan: &Plan,
    providers: &mut Providers<'_>,
    opts: &ExecuteOptions,
    confirm: &mut C,
    progress: &mut P,
    clock: &mut K,
) -> Result<ApplyResult>
where
    C: ConfirmCallback,
    P: ProgressCallback,
    K: Clock,
{
    let mut result = ApplyResult {
        generated_at: plan.generated_at,
        env: plan.env.clone(),
        dry_run: opts.dry_run,
        ok: true,
        results: Vec::new(),
        rollback: None,
    };

    if plan.is_empty() {
        log::info!("Plan is empty; nothing to apply");
        return Ok(result);
    }

    if !opts.dry_run
        && let Some(err) = missing_provider(plan.actions.iter().map(|a| &a.op), providers)
    {
        return Err(err);
    }

    if !opts.yes && !opts.dry_run {
        let prompt = format!("Apply {} action(s) to {}?", plan.len(), plan.env);
        match confirm.confirm(&prompt) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Apply to {} declined; nothing was executed", plan.env);
                result.ok = false;
                return Ok(result);
            }
            Err(e) => {
                log::warn!("Confirmation for {} failed ({e}); nothing was executed", plan.env);
                result.ok = false;
                return Ok(result);
            }
        }
    }

    let mut session = Session {
        providers,
        opts,
        progress,
        clock,
        redactor: Redactor::new(opts.secrets.iter().cloned()),
        profile: &plan.env,
    };

    let total = plan.len();
    let mut completed: Vec<(&PlanAction, Option<Value>)> = Vec::new();

    for (index, action) in plan.actions.iter().enumerate() {
        session.progress.on_action_start(index, total, action);
        let (action_result, raw) = session.perform(action)?;
        session.progress.on_action_complete(&action_result);

        let success = action_result.success;
        result.results.push(action_result);
        if !success {
            result.ok = false;
            break;
        }
        if !opts.dry_run {
            completed.push((action, raw));
        }
    }

    if result.ok {
        log::info!(
            "Applied {} action(s) to {}{}",
            result.succeeded(),
            plan.env,
            if opts.dry_run { " (dry run)" } else { "" }
        );
    } else {
        log::error!(
            "Apply to {} halted after {} of {} action(s); rolling back",
            plan.env,
            result.results.len(),
            total
        );
        result.rollback = Some(session.rollback(&completed)?);
    }

    Ok(result)
}

/// Collaborators of one run
struct Session<'r, 'a, P, K> {
    providers: &'r mut Providers<'a>,
    opts: &'r ExecuteOptions,
    progress: &'r mut P,
    clock: &'r mut K,
    redactor: Redactor,
    profile: &'r str,
}

impl<P: ProgressCallback, K: Clock> Session<'_, '_, P, K> {
    /// Run one action; returns its redacted result and the raw provider output
    fn perform(&mut self, action: &PlanAction) -> Result<(ActionResult, Option<Value>)> {
        let started_at = self.clock.now();
        let outcome = if self.opts.dry_run {
            Ok(None)
        } else {
            dispatch(&action.op, self.providers, self.opts, self.progress, self.clock)?
        };
        let finished_at = self.clock.now();

        let (success, message, raw) = match outcome {
            Ok(_) if self.opts.dry_run => (true, "skipped (dry run)".to_string(), None),
            Ok(output) => (true, "completed".to_string(), output),
            Err(e) => (false, self.redactor.text(&e.to_string()), None),
        };

        let result = ActionResult {
            action: self.redactor.action(action),
            success,
            started_at,
            finished_at,
            message,
            output: raw.as_ref().map(|v| self.redactor.value(v)),
        };
        log::info!(target: AUDIT_TARGET, "{}", audit::line(self.profile, &result, &self.redactor));
        Ok((result, raw))
    }

    fn rollback(&mut self, completed: &[(&PlanAction, Option<Value>)]) -> Result<RollbackReport> {
        let mut results = Vec::new();

        for (action, output) in completed.iter().rev() {
            let Some(undo) = compensation(action, output.as_ref()) else {
                log::info!(
                    "No compensation for {} {}; left in place",
                    action.kind(),
                    action.op.target()
                );
                continue;
            };

            self.progress.on_rollback_start(&undo);
            let (undo_result, _) = self.perform(&undo)?;
            self.progress.on_action_complete(&undo_result);
            if !undo_result.success {
                log::error!("Compensation {} failed: {}", undo.kind(), undo_result.message);
            }
            results.push(undo_result);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        let message = match (results.len(), failed) {
            (0, _) => "No completed action has a compensation".to_string(),
            (n, 0) => format!("Rolled back {n} action(s)"),
            (n, f) => format!("{f} of {n} compensation(s) failed"),
        };
        log::info!("{message}");

        Ok(RollbackReport {
            attempted: true,
            ok: failed == 0,
            results,
            message,
        })
    }
}
