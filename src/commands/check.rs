use anyhow::{Result, bail};
use converge::run_preflight_checks;

use super::{Inputs, print_report};
use crate::Context;
use crate::cli::InputArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &InputArgs) -> Result<()> {
    let inputs = Inputs::load(ctx, args)?;
    let plan = inputs.planner().plan(&inputs.current, &inputs.desired);
    let report = run_preflight_checks(&inputs.current, &inputs.desired, Some(&plan));

    ui::header(&format!("Preflight for {}", inputs.desired.env_name()));
    print_report(&report);

    if !report.ok {
        bail!(
            "Preflight failed with {} error(s) and {} warning(s)",
            report.errors.len(),
            report.warnings.len()
        );
    }

    if !ctx.quiet {
        ui::success(&format!(
            "Spec is valid: {} action(s) planned, {} warning(s)",
            plan.len(),
            report.warnings.len()
        ));
    }
    Ok(())
}
