//! Preflight: semantic validation of a desired spec and its plan
//!
//! Every check runs to completion so a caller sees all problems at once.
//! Errors block apply; warnings are advisory and always shown.

mod guests;
mod safety;

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{ActionOp, CurrentState, Declared, DesiredSpec, Plan};

/// Outcome of a preflight run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightReport {
    /// `true` exactly when `errors` is empty
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PreflightReport {
    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn finish(mut self) -> Self {
        self.ok = self.errors.is_empty();
        self
    }
}

/// Validate `desired` against `current`, and `plan` when given
pub fn run_preflight_checks(
    current: &CurrentState,
    desired: &DesiredSpec,
    plan: Option<&Plan>,
) -> PreflightReport {
    let mut report = PreflightReport::default();

    check_duplicates(desired, &mut report);
    check_nodes(current, desired, &mut report);
    guests::check_conflicts(desired, &mut report);
    guests::check_disks(current, desired, &mut report);
    guests::check_deletes(current, desired, &mut report);
    safety::check_server_ids(desired, &mut report);
    safety::check_confirmations(current, desired, &mut report);
    safety::check_storage_pool_drift(current, desired, &mut report);
    safety::check_crud(desired, &mut report);

    if let Some(plan) = plan {
        check_plan(plan, &mut report);
    }

    let report = report.finish();
    log::debug!(
        "Preflight finished: {} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );
    report
}

fn duplicates<T: Declared>(domain: &str, entries: &[T], report: &mut PreflightReport) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    for entry in entries {
        let key = entry.key();
        if !seen.insert(key.clone()) && reported.insert(key.clone()) {
            report.error(format!("Duplicate {domain} entry '{key}'"));
        }
    }
}

fn check_duplicates(d: &DesiredSpec, report: &mut PreflightReport) {
    duplicates("users", &d.users, report);
    duplicates("groups", &d.groups, report);
    duplicates("roles", &d.roles, report);
    duplicates("acls", &d.acls, report);
    duplicates("tokens", &d.tokens, report);
    duplicates("pools", &d.pools, report);
    duplicates("networks", &d.networks, report);
    duplicates("sdn_zones", &d.sdn_zones, report);
    duplicates("sdn_vnets", &d.sdn_vnets, report);
    duplicates("sdn_subnets", &d.sdn_subnets, report);
    duplicates("storages", &d.storages, report);
    duplicates("storage_pools", &d.storage_pools, report);
    duplicates("vms", &d.vms, report);
    duplicates("containers", &d.containers, report);
    duplicates("deletes", &d.deletes, report);
    duplicates("snapshots", &d.snapshots, report);
    duplicates("migrations", &d.migrations, report);
    duplicates("disk_moves", &d.disk_moves, report);
    duplicates("volume_copies", &d.volume_copies, report);
    duplicates("backups", &d.backups, report);
    duplicates("restores", &d.restores, report);
    duplicates("backup_jobs", &d.backup_jobs, report);
    duplicates("replication_jobs", &d.replication_jobs, report);
    duplicates("ha_groups", &d.ha_groups, report);
    duplicates("ha_resources", &d.ha_resources, report);
    duplicates("firewall_rules", &d.firewall_rules, report);
    duplicates("firewall_aliases", &d.firewall_aliases, report);
    duplicates("node_actions", &d.node_actions, report);
    duplicates("stacks", &d.stacks, report);
    duplicates("folders", &d.folders, report);
    duplicates("datasources", &d.datasources, report);
    duplicates("dashboards", &d.dashboards, report);
}

/// Nodes referenced by the desired spec but absent from the scan
fn check_nodes(current: &CurrentState, d: &DesiredSpec, report: &mut PreflightReport) {
    let mut refs: Vec<(&str, &str)> = Vec::new();

    refs.extend(d.vms.iter().map(|e| ("vms", e.node.as_str())));
    refs.extend(d.containers.iter().map(|e| ("containers", e.node.as_str())));
    refs.extend(d.networks.iter().map(|e| ("networks", e.node.as_str())));
    refs.extend(d.storage_pools.iter().map(|e| ("storage_pools", e.node.as_str())));
    refs.extend(d.snapshots.iter().map(|e| ("snapshots", e.node.as_str())));
    refs.extend(d.migrations.iter().map(|e| ("migrations", e.target.as_str())));
    refs.extend(d.disk_moves.iter().map(|e| ("disk_moves", e.node.as_str())));
    refs.extend(d.volume_copies.iter().map(|e| ("volume_copies", e.node.as_str())));
    refs.extend(d.backups.iter().map(|e| ("backups", e.node.as_str())));
    refs.extend(d.restores.iter().map(|e| ("restores", e.node.as_str())));
    refs.extend(d.node_actions.iter().map(|e| ("node_actions", e.node.as_str())));
    refs.extend(
        d.deletes
            .iter()
            .filter_map(|e| e.node.as_deref().map(|n| ("deletes", n))),
    );

    let unknown: BTreeSet<(&str, &str)> = refs
        .into_iter()
        .filter(|(_, node)| !current.has_node(node))
        .collect();
    for (domain, node) in unknown {
        report.warn(format!(
            "{domain}: node '{node}' is not in the current state (new or not yet scanned?)"
        ));
    }
}

fn check_plan(plan: &Plan, report: &mut PreflightReport) {
    if plan.is_empty() {
        report.warn("Plan has no actions; infrastructure already matches the desired spec");
        return;
    }

    for action in &plan.actions {
        match &action.op {
            ActionOp::DeleteVm { node, vmid, .. } => {
                report.warn(format!("Plan deletes VM {vmid} on {node}"));
            }
            ActionOp::DeleteCt { node, vmid, .. } => {
                report.warn(format!("Plan deletes container {vmid} on {node}"));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::build_plan;
    use serde_json::{Value, json};

    fn check(current: Value, desired: Value) -> PreflightReport {
        let current: CurrentState = serde_json::from_value(current).unwrap();
        let desired: DesiredSpec = serde_json::from_value(desired).unwrap();
        let plan = build_plan(&current, &desired);
        run_preflight_checks(&current, &desired, Some(&plan))
    }

    #[test]
    fn test_duplicate_keys_are_errors() {
        let report = check(
            json!({"nodes": [{"name": "pve1"}]}),
            json!({"vms": [{"vmid": 100, "node": "pve1"}, {"vmid": 100, "node": "pve1"}, {"vmid": 100, "node": "pve1"}]}),
        );
        assert!(!report.ok);
        assert_eq!(report.errors, vec!["Duplicate vms entry '100'"]);
    }

    #[test]
    fn test_converged_spec_only_warns() {
        let state = json!({"nodes": [{"name": "pve1"}], "groups": [{"groupid": "ops"}]});
        let report = check(state, json!({"groups": [{"groupid": "ops"}]}));
        assert!(report.ok);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("no actions"));
    }

    #[test]
    fn test_unknown_node_is_warning() {
        let report = check(
            json!({"nodes": [{"name": "pve1"}]}),
            json!({"vms": [{"vmid": 100, "node": "pve9"}, {"vmid": 101, "node": "pve9"}]}),
        );
        assert!(report.ok);
        let node_warnings: Vec<_> = report.warnings.iter().filter(|w| w.contains("pve9")).collect();
        assert_eq!(node_warnings.len(), 1);
    }

    #[test]
    fn test_checks_do_not_short_circuit() {
        let report = check(
            json!({"nodes": [{"name": "pve1"}]}),
            json!({
                "users": [{"userid": "a@pve"}, {"userid": "a@pve"}],
                "stacks": [{"name": "web", "endpoint_id": 1, "ensure": "absent"}],
                "node_actions": [{"node": "pve1", "action": "shutdown"}],
                "hypervisor_crud": [{"method": "get", "path": "/../etc"}]
            }),
        );
        assert!(!report.ok);
        assert_eq!(report.errors.len(), 4, "{:?}", report.errors);
    }

    #[test]
    fn test_plan_deleting_guests_warns() {
        let report = check(
            json!({"nodes": [{"name": "pve1"}], "vms": [{"vmid": 300, "node": "pve1", "status": "stopped"}]}),
            json!({"deletes": [{"vmid": 300}]}),
        );
        assert!(report.ok);
        assert!(report.warnings.iter().any(|w| w == "Plan deletes VM 300 on pve1"));
    }
}
