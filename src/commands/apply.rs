use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use converge::audit;
use converge::{
    ApplyResult, EnrichedPlan, Plan, Planner, Providers, Redactor, SystemClock, execute_plan,
    run_preflight_checks,
};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::{Inputs, print_report};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::config;
use crate::ui::{self, TerminalConfirm, TerminalProgress};

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let inputs = Inputs::load(ctx, &args.input)?;
    let saved = args
        .plan
        .as_deref()
        .map(config::load_document::<Plan>)
        .transpose()?;
    let plan = resolve_plan(&inputs.planner(), &inputs, saved)?;

    let report = run_preflight_checks(&inputs.current, &inputs.desired, Some(&plan));
    print_report(&report);
    if !report.ok {
        bail!(
            "Preflight failed with {} error(s); nothing was applied",
            report.errors.len()
        );
    }

    if plan.is_empty() {
        ui::success("No changes. Current state matches the desired spec.");
        return Ok(());
    }

    if !ctx.quiet {
        super::plan::print_plan(&EnrichedPlan::new(&plan), ctx.verbose > 0);
        println!();
    }

    let opts = inputs.config.execute_options(args.dry_run, args.yes);
    // Backend clients plug in here; none ship with the binary.
    let mut providers = Providers::new();
    let result = execute_plan(
        &plan,
        &mut providers,
        &opts,
        &mut TerminalConfirm,
        &mut TerminalProgress { quiet: ctx.quiet },
        &mut SystemClock,
    )
    .context("Apply stopped before any action ran")?;

    if let Some(out) = &args.out {
        config::write_json(out, &result)?;
        log::info!("Wrote apply result to {}", out.display());
    }

    let redactor = Redactor::new(&opts.secrets);
    let lines = audit::lines(&result, &redactor);
    if !lines.is_empty() {
        let path = inputs.config.audit_log_path()?;
        append_audit(&path, &lines)?;
        log::debug!("Appended {} audit line(s) to {}", lines.len(), path.display());
    }

    print_summary(&result);
    if !result.ok {
        match result.first_failure() {
            Some(failed) => bail!("Apply failed at {}: {}", failed.action.kind(), failed.message),
            None => bail!("Apply was not confirmed"),
        }
    }
    Ok(())
}

/// The plan to execute: a saved plan when it still matches, else a fresh one
///
/// A saved plan is replayed against the current inputs at its own timestamp,
/// so time-derived names (safety snapshots) compare equal.
fn resolve_plan(planner: &Planner, inputs: &Inputs, saved: Option<Plan>) -> Result<Plan> {
    let Some(saved) = saved else {
        return Ok(planner.plan(&inputs.current, &inputs.desired));
    };

    let fresh = planner.plan_at(&inputs.current, &inputs.desired, saved.generated_at);
    if fresh.env != saved.env {
        bail!(
            "Saved plan targets {} but the desired spec targets {}",
            saved.env,
            fresh.env
        );
    }
    if fresh.fingerprint() != saved.fingerprint() {
        bail!(
            "Saved plan is stale ({} action(s) saved, {} planned now); run `fleetform plan` again",
            saved.len(),
            fresh.len()
        );
    }
    Ok(saved)
}

fn append_audit(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Could not open audit log {}", path.display()))?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    Ok(())
}

fn print_summary(result: &ApplyResult) {
    println!();
    if result.dry_run {
        ui::info(&format!(
            "Dry run - {} action(s) would be applied to {}",
            result.results.len(),
            result.env
        ));
        return;
    }

    ui::kv("Succeeded", &result.succeeded().to_string());
    ui::kv("Failed", &result.failed().to_string());

    if let Some(rollback) = &result.rollback {
        let status = if rollback.ok {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("  {} {} {}", status, "Rollback:".dimmed(), rollback.message);
    }

    if result.ok {
        ui::success(&format!(
            "Applied {} action(s) to {}",
            result.succeeded(),
            result.env
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FleetformConfig;
    use chrono::{TimeZone, Utc};
    use converge::{CurrentState, DesiredSpec};
    use tempfile::TempDir;

    fn inputs(desired: serde_json::Value) -> Inputs {
        Inputs {
            config: FleetformConfig::default(),
            current: CurrentState::default(),
            desired: serde_json::from_value::<DesiredSpec>(desired).unwrap(),
        }
    }

    #[test]
    fn test_saved_plan_replays_at_its_timestamp() {
        let inputs = inputs(serde_json::json!({"env": "lab", "pools": [{"poolid": "ci"}]}));
        let planner = inputs.planner();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let saved = planner.plan_at(&inputs.current, &inputs.desired, at);

        let plan = resolve_plan(&planner, &inputs, Some(saved.clone())).unwrap();
        assert_eq!(plan, saved);

        let fresh = resolve_plan(&planner, &inputs, None).unwrap();
        assert_ne!(fresh.generated_at, at);
        assert_eq!(fresh.fingerprint(), saved.fingerprint());
    }

    #[test]
    fn test_stale_plan_rejected() {
        let old = inputs(serde_json::json!({"env": "lab", "pools": [{"poolid": "ci"}]}));
        let saved = old.planner().plan(&old.current, &old.desired);

        let changed = inputs(serde_json::json!({
            "env": "lab",
            "pools": [{"poolid": "ci"}, {"poolid": "qa"}]
        }));
        let err = resolve_plan(&changed.planner(), &changed, Some(saved.clone())).unwrap_err();
        assert!(err.to_string().contains("stale"));

        let other_env = inputs(serde_json::json!({"env": "prod", "pools": [{"poolid": "ci"}]}));
        let err = resolve_plan(&other_env.planner(), &other_env, Some(saved)).unwrap_err();
        assert!(err.to_string().contains("targets lab"));
    }

    #[test]
    fn test_append_audit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("audit.log");

        append_audit(&path, &["first".to_string()]).unwrap();
        append_audit(&path, &["second".to_string(), "third".to_string()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\nthird\n");
    }
}
