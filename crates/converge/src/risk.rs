//! Risk annotation of plan actions
//!
//! Classification looks at the action kind only, through an ordered table of
//! name patterns where the first match wins. The result feeds the enriched
//! plan that `fleetform plan` prints and saves next to the raw plan.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{ActionKind, Plan, PlanAction};

use Downtime as D;
use RiskLevel::{High, Low, Medium};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Expected service interruption while the action runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Downtime {
    None,
    /// A restart or live handover
    Seconds,
    /// Until a later action or the operator brings it back
    Minutes,
    /// Every guest on the node
    Node,
    /// The object is gone
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnnotation {
    pub level: RiskLevel,
    /// Take a snapshot or backup of the guest first
    pub snapshot_advised: bool,
    pub rollback_hint: String,
    pub downtime: Downtime,
}

struct Rule {
    pattern: &'static str,
    level: RiskLevel,
    snapshot_advised: bool,
    downtime: Downtime,
    rollback_hint: &'static str,
}

const fn rule(
    pattern: &'static str,
    level: RiskLevel,
    snapshot_advised: bool,
    downtime: Downtime,
    rollback_hint: &'static str,
) -> Rule {
    Rule {
        pattern,
        level,
        snapshot_advised,
        downtime,
        rollback_hint,
    }
}

const RULES: &[Rule] = &[
    rule(r"^(reboot|shutdown)_node$", High, false, D::Node, "power the node back on; guests with onboot set start again"),
    rule(r"^delete_(vm|ct)$", High, true, D::Permanent, "restore the guest from its latest backup"),
    rule(r"^(create|delete)_storage_pool$", High, false, D::None, "not reversible; member devices are wiped"),
    rule(r"^restore_guest$", High, true, D::Minutes, "restore the previous archive of the guest"),
    rule(r"^delete_storage$", High, false, D::None, "add the storage definition again; data on it is untouched"),
    rule(r"^(revoke_acl|delete_(user|group|role|token))$", High, false, D::None, "recreate it from the previous spec"),
    rule(r"^delete_snapshot$", Medium, false, D::None, "not reversible"),
    rule(r"^detach_disk$", Medium, true, D::None, "attach the unused volume again"),
    rule(r"^stop_(vm|ct)$", Medium, true, D::Minutes, "start the guest again"),
    rule(r"^reboot_(vm|ct)$", Medium, false, D::Seconds, "none needed"),
    rule(r"^migrate_guest$", Medium, false, D::Seconds, "migrate the guest back to its source node"),
    rule(r"^move_disk$", Medium, true, D::None, "move the disk back to its source storage"),
    rule(r"^update_(vm|ct)_config$", Medium, true, D::None, "apply the old values from the change list"),
    rule(r"^resize_(ct_)?disk$", Medium, true, D::None, "disks cannot shrink; roll back to the snapshot"),
    rule(r"^(reload_network|apply_sdn)$", Medium, false, D::Seconds, "revert the interface spec and reload again"),
    rule(r"_(network|sdn_zone|sdn_vnet|sdn_subnet|firewall_rule|firewall_alias)$", Medium, false, D::None, "revert the desired spec and plan again"),
    rule(r"_request$", Medium, false, D::None, "ad hoc call; no automatic rollback"),
    rule(r"^delete_", Medium, false, D::None, "recreate it from the previous spec"),
    rule(r"^redeploy_stack$", Low, false, D::Seconds, "redeploy the previous revision"),
    rule(r"^update_", Low, false, D::None, "apply the old values from the change list"),
    rule(r"^(create|clone)_(vm|ct)$", Low, false, D::None, "delete the new guest"),
    rule(r"^(start|resume)_", Low, false, D::None, "stop the guest again"),
    rule(r"^create_", Low, false, D::None, "delete the new object"),
];

static COMPILED: LazyLock<Vec<(Regex, &'static Rule)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|r| {
            let re = Regex::new(r.pattern).expect("valid risk rule regex (verified by tests)");
            (re, r)
        })
        .collect()
});

/// Risk of one action kind
pub fn assess(kind: ActionKind) -> RiskAnnotation {
    let name = kind.as_str();
    match COMPILED.iter().find(|(re, _)| re.is_match(name)) {
        Some((_, rule)) => RiskAnnotation {
            level: rule.level,
            snapshot_advised: rule.snapshot_advised,
            rollback_hint: rule.rollback_hint.to_string(),
            downtime: rule.downtime,
        },
        None => RiskAnnotation {
            level: Low,
            snapshot_advised: false,
            rollback_hint: "none needed".to_string(),
            downtime: D::None,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedAction<'a> {
    #[serde(flatten)]
    pub action: &'a PlanAction,
    pub risk: RiskAnnotation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// A plan with every action annotated, as saved by `fleetform plan`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPlan<'a> {
    pub generated_at: DateTime<Utc>,
    pub env: &'a str,
    pub fingerprint: String,
    pub summary: RiskSummary,
    pub actions: Vec<AnnotatedAction<'a>>,
}

impl<'a> EnrichedPlan<'a> {
    pub fn new(plan: &'a Plan) -> Self {
        let actions: Vec<_> = plan
            .actions
            .iter()
            .map(|action| AnnotatedAction {
                action,
                risk: assess(action.kind()),
            })
            .collect();

        let mut summary = RiskSummary::default();
        for a in &actions {
            match a.risk.level {
                High => summary.high += 1,
                Medium => summary.medium += 1,
                Low => summary.low += 1,
            }
        }

        Self {
            generated_at: plan.generated_at,
            env: &plan.env,
            fingerprint: plan.fingerprint(),
            summary,
            actions,
        }
    }

    pub fn highest(&self) -> Option<RiskLevel> {
        self.actions.iter().map(|a| a.risk.level).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn test_rules_compile_and_cover_every_kind() {
        assert_eq!(COMPILED.len(), RULES.len());
        for kind in ActionKind::iter() {
            let risk = assess(kind);
            assert!(!risk.rollback_hint.is_empty(), "{kind}");
        }
    }

    #[test]
    fn test_levels() {
        assert_eq!(assess(ActionKind::ShutdownNode).level, High);
        assert_eq!(assess(ActionKind::ShutdownNode).downtime, Downtime::Node);
        assert_eq!(assess(ActionKind::DeleteVm).level, High);
        assert!(assess(ActionKind::DeleteVm).snapshot_advised);
        assert_eq!(assess(ActionKind::CreateStoragePool).level, High);
        assert_eq!(assess(ActionKind::StopVm).level, Medium);
        assert_eq!(assess(ActionKind::UpdateSdnZone).level, Medium);
        assert_eq!(assess(ActionKind::HypervisorRequest).level, Medium);
        assert_eq!(assess(ActionKind::DeleteFolder).level, Medium);
        assert_eq!(assess(ActionKind::UpdateUser).level, Low);
        assert_eq!(assess(ActionKind::CreateVm).level, Low);
        assert_eq!(assess(ActionKind::StartCt).level, Low);
    }

    #[test]
    fn test_enriched_plan_summary() {
        let plan = Plan {
            generated_at: Utc::now(),
            env: "lab".into(),
            actions: serde_json::from_value(json!([
                {"kind": "start_vm", "node": "pve1", "vmid": 100, "reason": "r"},
                {"kind": "stop_vm", "node": "pve1", "vmid": 101, "reason": "r"},
                {"kind": "delete_vm", "node": "pve1", "vmid": 102, "purge": false, "reason": "r"}
            ]))
            .unwrap(),
        };

        let enriched = EnrichedPlan::new(&plan);
        assert_eq!(
            enriched.summary,
            RiskSummary {
                high: 1,
                medium: 1,
                low: 1
            }
        );
        assert_eq!(enriched.highest(), Some(High));

        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["actions"][1]["kind"], "stop_vm");
        assert_eq!(value["actions"][1]["risk"]["level"], "medium");
        assert_eq!(value["actions"][2]["risk"]["downtime"], "permanent");
        assert_eq!(value["fingerprint"], plan.fingerprint());
    }
}
