//! # Converge
//!
//! Plan, validate and apply infrastructure changes across a hypervisor
//! cluster, a container runtime and an observability platform.
//!
//! The crate compares an operator-declared [`DesiredSpec`] with the last
//! scanned [`CurrentState`] and reconciles the two in three steps:
//!
//! - **Planner**: a pure function producing an ordered [`Plan`] of typed actions
//! - **Preflight**: semantic validation of the desired spec and plan, as data
//! - **Executor**: runs the plan one action at a time and rolls back on failure
//!
//! Ad hoc API calls pass through a per-backend [`policy`] gate, and every
//! result is scrubbed by a [`Redactor`] before it is stored or logged.
//!
//! ## Example
//!
//! ```ignore
//! use converge::{
//!     build_plan, execute_plan, run_preflight_checks, AutoConfirm, ExecuteOptions,
//!     NoProgress, Providers, SystemClock,
//! };
//!
//! let plan = build_plan(&current, &desired);
//! let report = run_preflight_checks(&current, &desired, Some(&plan));
//! if !report.ok {
//!     anyhow::bail!("preflight failed: {:?}", report.errors);
//! }
//!
//! let mut providers = Providers::new().with_hypervisor(&mut client);
//! let result = execute_plan(
//!     &plan,
//!     &mut providers,
//!     &ExecuteOptions::default(),
//!     &mut AutoConfirm,
//!     &mut NoProgress,
//!     &mut SystemClock,
//! )?;
//! ```
//!
//! ## Provider Traits
//!
//! Remote clients and interaction are injected:
//!
//! - [`HypervisorProvider`], [`ContainerProvider`], [`ObservabilityProvider`]: backend clients
//! - [`ConfirmCallback`]: Handles user confirmations
//! - [`ProgressCallback`]: Receives progress and task updates
//! - [`Clock`]: Time source for timestamps and task polling
//!
//! This allows the crate to be used without a terminal, real timers or a
//! specific HTTP stack.

pub mod audit;
pub mod context;
pub mod error;
pub mod executor;
pub mod model;
pub mod planner;
pub mod policy;
pub mod preflight;
pub mod provider;
pub mod redact;
pub mod risk;
pub mod size;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, Clock, ConfirmCallback, ManualClock, NoProgress, ProgressCallback,
    SystemClock, TaskProgress,
};
pub use error::{Error, Result};
pub use executor::{ExecuteOptions, execute_plan};
pub use model::{ActionKind, ActionOp, ActionResult, ApplyResult, CurrentState, DesiredSpec, Plan, PlanAction};
pub use planner::{CapacityPolicy, Planner, build_plan};
pub use preflight::{PreflightReport, run_preflight_checks};
pub use provider::{
    ContainerProvider, HypervisorProvider, ObservabilityProvider, Outcome, ProviderError,
    NodeCapabilities, ProviderResult, Providers, TaskHandle, TaskStatus,
};
pub use redact::Redactor;
pub use risk::{EnrichedPlan, RiskAnnotation, RiskLevel};
