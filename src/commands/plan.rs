use anyhow::{Result, bail};
use colored::Colorize;
use converge::{EnrichedPlan, Plan, run_preflight_checks};
use std::path::{Path, PathBuf};

use super::{Inputs, print_report};
use crate::Context;
use crate::cli::PlanArgs;
use crate::config;
use crate::ui;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let inputs = Inputs::load(ctx, &args.input)?;
    let plan = inputs.planner().plan(&inputs.current, &inputs.desired);
    let report = run_preflight_checks(&inputs.current, &inputs.desired, Some(&plan));
    let enriched = EnrichedPlan::new(&plan);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&enriched)?);
    } else {
        print_plan(&enriched, ctx.verbose > 0);
    }
    print_report(&report);

    if !report.ok {
        bail!("Preflight failed with {} error(s)", report.errors.len());
    }

    if let Some(out) = &args.out {
        write_artifacts(out, &plan, &enriched)?;
        if !ctx.quiet {
            ui::success(&format!("Plan written to {}", out.display()));
        }
    }

    Ok(())
}

/// Print the annotated plan as a table, one action per line
pub fn print_plan(enriched: &EnrichedPlan<'_>, show_reasons: bool) {
    ui::header(&format!("Plan for {}", enriched.env));

    if enriched.actions.is_empty() {
        ui::success("No changes. Current state matches the desired spec.");
        return;
    }

    for (i, annotated) in enriched.actions.iter().enumerate() {
        let action = annotated.action;
        println!(
            "  {:>3}  {}  {} {}",
            (i + 1).to_string().dimmed(),
            ui::risk_label(annotated.risk.level),
            action.kind().as_str().bold(),
            action.op.target()
        );
        if show_reasons {
            ui::dim(&format!("     {}", action.reason));
            if annotated.risk.snapshot_advised {
                ui::dim(&format!("     rollback: {}", annotated.risk.rollback_hint));
            }
        }
    }

    println!();
    let summary = &enriched.summary;
    ui::kv(
        "Actions",
        &format!(
            "{} ({} high, {} medium, {} low)",
            enriched.actions.len(),
            summary.high,
            summary.medium,
            summary.low
        ),
    );
    ui::kv("Fingerprint", &enriched.fingerprint);
}

/// Risk-annotated companion of a plan file: `plan.json` -> `plan.risk.json`
pub fn risk_path(out: &Path) -> PathBuf {
    out.with_extension("risk.json")
}

fn write_artifacts(out: &Path, plan: &Plan, enriched: &EnrichedPlan<'_>) -> Result<()> {
    config::write_json(out, plan)?;
    config::write_json(&risk_path(out), enriched)?;
    log::info!("Wrote {} and {}", out.display(), risk_path(out).display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{CurrentState, DesiredSpec, build_plan};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_risk_path() {
        assert_eq!(
            risk_path(Path::new("out/plan.json")),
            PathBuf::from("out/plan.risk.json")
        );
        assert_eq!(risk_path(Path::new("plan")), PathBuf::from("plan.risk.json"));
    }

    #[test]
    fn test_write_artifacts() {
        let dir = TempDir::new().unwrap();
        let desired: DesiredSpec = serde_json::from_value(serde_json::json!({
            "env": "lab",
            "pools": [{"poolid": "ci"}]
        }))
        .unwrap();
        let plan = build_plan(&CurrentState::default(), &desired);
        let enriched = EnrichedPlan::new(&plan);

        let out = dir.path().join("plan.json");
        write_artifacts(&out, &plan, &enriched).unwrap();

        let saved: Plan = config::load_document(&out).unwrap();
        assert_eq!(saved.fingerprint(), plan.fingerprint());

        let risk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(risk_path(&out)).unwrap()).unwrap();
        assert_eq!(risk["env"], "lab");
        assert_eq!(risk["actions"][0]["kind"], "create_pool");
        assert_eq!(risk["actions"][0]["risk"]["level"], "low");
    }
}
