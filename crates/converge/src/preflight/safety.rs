//! Safety gates: server ids for deletes, confirmation sentinels, ad hoc calls

use super::PreflightReport;
use crate::model::{Backend, CrudSpec, CurrentState, Declared, DesiredSpec, NodeAction};
use crate::planner::diff::field_changes;
use crate::policy::{self, CONFIRM_FIELD, CONFIRM_SENTINEL};

/// `ensure: absent` on entities that can only be deleted by server id
pub(super) fn check_server_ids(d: &DesiredSpec, report: &mut PreflightReport) {
    for (i, stack) in d.stacks.iter().enumerate() {
        if stack.ensure.is_absent() && stack.id.is_none() {
            report.error(format!(
                "stacks[{i}]: stack '{}' is marked absent but has no id",
                stack.key()
            ));
        }
    }

    let uid_domains = [
        ("folders", uid_gaps(d.folders.iter().map(|f| (f.ensure, &f.uid, &f.title)))),
        ("datasources", uid_gaps(d.datasources.iter().map(|s| (s.ensure, &s.uid, &s.name)))),
        ("dashboards", uid_gaps(d.dashboards.iter().map(|b| (b.ensure, &b.uid, &b.title)))),
    ];
    for (domain, gaps) in uid_domains {
        for (i, name) in gaps {
            report.error(format!("{domain}[{i}]: '{name}' is marked absent but has no uid"));
        }
    }
}

fn uid_gaps<'a>(
    entries: impl Iterator<Item = (crate::model::Ensure, &'a Option<String>, &'a String)>,
) -> Vec<(usize, &'a str)> {
    entries
        .enumerate()
        .filter(|(_, (ensure, uid, _))| ensure.is_absent() && uid.is_none())
        .map(|(i, (_, _, name))| (i, name.as_str()))
        .collect()
}

/// High-risk entries must carry the confirmation sentinel
pub(super) fn check_confirmations(
    current: &CurrentState,
    d: &DesiredSpec,
    report: &mut PreflightReport,
) {
    for (i, spec) in d.node_actions.iter().enumerate() {
        let confirmed = policy::is_confirm_value(spec.confirm.as_deref())
            || policy::is_confirmed(spec.payload.as_ref());
        if !confirmed {
            let verb = match spec.action {
                NodeAction::Reboot => "reboot",
                NodeAction::Shutdown => "shutdown",
            };
            report.error(format!(
                "node_actions[{i}]: {verb} of node '{}' is high-risk; set {CONFIRM_FIELD} = \"{CONFIRM_SENTINEL}\"",
                spec.node
            ));
        }
    }

    for (i, pool) in d.storage_pools.iter().enumerate() {
        let exists = current.storage_pools.iter().any(|p| p.key() == pool.key());
        if pool.ensure.is_present() && !exists && !policy::is_confirm_value(pool.confirm.as_deref()) {
            report.error(format!(
                "storage_pools[{i}]: creating '{}' wipes {}; set {CONFIRM_FIELD} = \"{CONFIRM_SENTINEL}\"",
                pool.key(),
                if pool.devices.is_empty() {
                    "its devices".to_string()
                } else {
                    pool.devices.join(", ")
                }
            ));
        }
    }

    for (i, restore) in d.restores.iter().enumerate() {
        if restore.force && !policy::is_confirm_value(restore.confirm.as_deref()) {
            report.error(format!(
                "restores[{i}]: forced restore of {} overwrites the guest; set {CONFIRM_FIELD} = \"{CONFIRM_SENTINEL}\"",
                restore.vmid
            ));
        }
    }
}

/// Storage pools cannot be reshaped in place, so drift is only reported
pub(super) fn check_storage_pool_drift(
    current: &CurrentState,
    d: &DesiredSpec,
    report: &mut PreflightReport,
) {
    for pool in d.storage_pools.iter().filter(|p| p.ensure.is_present()) {
        let Some(existing) = current.storage_pools.iter().find(|p| p.key() == pool.key()) else {
            continue;
        };
        let changes = field_changes(pool, existing, &[CONFIRM_FIELD]);
        if !changes.is_empty() {
            let fields: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
            report.warn(format!(
                "storage_pools: '{}' differs in {} and cannot be changed in place",
                pool.key(),
                fields.join(", ")
            ));
        }
    }
}

/// Every ad hoc call must pass the policy of its backend
pub(super) fn check_crud(d: &DesiredSpec, report: &mut PreflightReport) {
    let domains: [(&str, Backend, &[CrudSpec]); 3] = [
        ("hypervisor_crud", Backend::Hypervisor, &d.hypervisor_crud),
        ("container_crud", Backend::Containers, &d.container_crud),
        ("observability_crud", Backend::Observability, &d.observability_crud),
    ];

    for (domain, scope, entries) in domains {
        for (i, spec) in entries.iter().enumerate() {
            if let Err(violation) = policy::evaluate(scope, spec) {
                report.error(format!("{domain}[{i}]: {violation}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desired(value: serde_json::Value) -> DesiredSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_absent_without_server_id() {
        let d = desired(json!({
            "stacks": [{"name": "web", "endpoint_id": 1, "ensure": "absent"},
                       {"name": "api", "endpoint_id": 1, "id": 7, "ensure": "absent"}],
            "dashboards": [{"title": "Nodes", "ensure": "absent"}],
            "datasources": [{"name": "prom", "uid": "p1", "ensure": "absent"}]
        }));
        let mut report = PreflightReport::default();
        check_server_ids(&d, &mut report);
        assert_eq!(
            report.errors,
            vec![
                "stacks[0]: stack 'web@1' is marked absent but has no id",
                "dashboards[0]: 'Nodes' is marked absent but has no uid",
            ]
        );
    }

    #[test]
    fn test_node_action_confirmation() {
        let d = desired(json!({"node_actions": [
            {"node": "pve1", "action": "reboot"},
            {"node": "pve2", "action": "reboot", "confirm": "I_UNDERSTAND"},
            {"node": "pve3", "action": "shutdown", "payload": {"confirm": "I_UNDERSTAND"}},
            {"node": "pve4", "action": "shutdown", "confirm": "yes"}
        ]}));
        let mut report = PreflightReport::default();
        check_confirmations(&CurrentState::default(), &d, &mut report);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("node_actions[0]: reboot of node 'pve1'"));
        assert!(report.errors[1].starts_with("node_actions[3]: shutdown"));
    }

    #[test]
    fn test_new_storage_pool_and_forced_restore_need_confirmation() {
        let d = desired(json!({
            "storage_pools": [
                {"node": "pve1", "name": "tank", "type": "zfs", "devices": ["/dev/sdb", "/dev/sdc"]},
                {"node": "pve1", "name": "fast", "type": "lvmthin", "confirm": "I_UNDERSTAND"}
            ],
            "restores": [{"vmid": 100, "node": "pve1", "archive": "a", "force": true}]
        }));
        let mut report = PreflightReport::default();
        check_confirmations(&CurrentState::default(), &d, &mut report);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("/dev/sdb, /dev/sdc"));
        assert!(report.errors[1].starts_with("restores[0]"));
    }

    #[test]
    fn test_existing_pool_drift_is_warning() {
        let current: CurrentState = serde_json::from_value(json!({"storage_pools": [
            {"node": "pve1", "name": "tank", "type": "zfs", "raidlevel": "mirror"}
        ]}))
        .unwrap();
        let d = desired(json!({"storage_pools": [
            {"node": "pve1", "name": "tank", "type": "zfs", "raidlevel": "raidz"}
        ]}));
        let mut report = PreflightReport::default();
        check_confirmations(&current, &d, &mut report);
        check_storage_pool_drift(&current, &d, &mut report);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("raidlevel"));
    }

    #[test]
    fn test_crud_rejections_name_their_field() {
        let d = desired(json!({
            "hypervisor_crud": [
                {"method": "get", "path": "/nodes"},
                {"method": "get", "path": "/nodes"},
                {"method": "post", "path": "/access/users", "payload": {"userid": "x@pve"}}
            ],
            "observability_crud": [
                {"method": "post", "path": "/api/folders", "body": {"title": "x", "confirm": "I_UNDERSTAND"}}
            ]
        }));
        let mut report = PreflightReport::default();
        check_crud(&d, &mut report);
        assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
        assert!(report.errors[0].starts_with("hypervisor_crud[2]: POST /access/users is high-risk"));
    }

    #[test]
    fn test_crud_query_in_path_is_an_error() {
        let d = desired(json!({
            "hypervisor_crud": [
                {"method": "post", "path": "/nodes/pve1/status?command=shutdown"},
                {"method": "post", "path": "/nodes/pve1/qemu/101/status/stop?x=1"}
            ]
        }));
        let mut report = PreflightReport::default();
        check_crud(&d, &mut report);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors[0].starts_with("hypervisor_crud[0]: path '/nodes/pve1/status?command=shutdown'"));
        assert!(report.errors[1].contains("query or fragment"));
    }
}
