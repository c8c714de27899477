pub mod apply;
pub mod check;
pub mod plan;

use anyhow::Result;
use converge::{CurrentState, DesiredSpec, Planner, PreflightReport};

use crate::Context;
use crate::cli::InputArgs;
use crate::config::{self, FleetformConfig};
use crate::ui;

/// Config plus the two documents every planning command reads
pub struct Inputs {
    pub config: FleetformConfig,
    pub current: CurrentState,
    pub desired: DesiredSpec,
}

impl Inputs {
    pub fn load(ctx: &Context, args: &InputArgs) -> Result<Self> {
        let config = FleetformConfig::load(ctx.config.as_deref())?;
        let current: CurrentState = config::load_document(&args.state)?;
        let mut desired: DesiredSpec = config::load_document(&args.spec)?;

        if desired.env.is_none() {
            desired.env.clone_from(&config.profile);
        }

        log::info!(
            "Loaded spec {} ({}) and state {}",
            args.spec.display(),
            desired.env_name(),
            args.state.display()
        );
        Ok(Self {
            config,
            current,
            desired,
        })
    }

    pub fn planner(&self) -> Planner {
        Planner::new(self.config.capacity.clone())
    }
}

/// Print preflight findings, errors last
pub fn print_report(report: &PreflightReport) {
    for warning in &report.warnings {
        ui::warn(warning);
    }
    for error in &report.errors {
        ui::error(error);
    }
}
