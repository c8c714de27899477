use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fleetform")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan, check and apply declarative changes to a virtualization fleet", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: fleetform.toml in the config dir)
    #[arg(long, global = true, env = "FLEETFORM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the actions needed to converge the current state on the desired spec
    Plan(PlanArgs),

    /// Validate the desired spec (and the plan it produces) without applying
    Check(InputArgs),

    /// Plan, check and execute, rolling back on failure
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Input files shared by every command that plans
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Desired spec (.toml or .json)
    #[arg(short, long)]
    pub spec: PathBuf,

    /// Current-state snapshot from a scanner (.toml or .json)
    #[arg(long)]
    pub state: PathBuf,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write the plan as JSON; the risk-annotated plan lands next to it
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print the risk-annotated plan as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Plan file from `fleetform plan --out`; refused when stale
    #[arg(short, long)]
    pub plan: Option<PathBuf>,

    /// Show what would happen without calling any backend
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Write the apply result as JSON
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}
