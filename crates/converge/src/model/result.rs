//! Execution results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::PlanAction;

/// Outcome of one executed (or skipped) action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action: PlanAction,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

/// Outcome of the compensation pass after a failed forward pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub attempted: bool,
    /// Every attempted compensation succeeded
    pub ok: bool,
    pub results: Vec<ActionResult>,
    pub message: String,
}

/// Outcome of one executor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub generated_at: DateTime<Utc>,
    pub env: String,
    pub dry_run: bool,
    /// Forward pass outcome only; see `rollback` for compensations
    pub ok: bool,
    pub results: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
}

impl ApplyResult {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    /// First failing result of the forward pass
    pub fn first_failure(&self) -> Option<&ActionResult> {
        self.results.iter().find(|r| !r.success)
    }
}
