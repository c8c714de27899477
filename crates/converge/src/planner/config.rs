//! Config-object domains: access, networking, storage, cluster services,
//! application objects and firewall

use std::collections::BTreeSet;

use serde::Serialize;

use super::diff::{DomainDiff, describe, diff_by, diff_keyed};
use super::{PlanContext, Phases};
use crate::model::{ActionOp, ConfigChange, Declared, PlanAction};

/// Actions produced for one domain, split by phase
#[derive(Default)]
struct Reconciled {
    upserts: Vec<PlanAction>,
    deletes: Vec<PlanAction>,
}

/// Turn a domain diff into actions
///
/// `update` and `delete` may decline (return `None`) when the action cannot
/// be built safely, e.g. a server id is unknown.
fn reconcile<T, C, U, D>(
    diff: DomainDiff<'_, T>,
    label: &str,
    create: C,
    update: U,
    delete: D,
) -> Reconciled
where
    T: Declared + Serialize,
    C: Fn(&T) -> ActionOp,
    U: Fn(&T, &T, Vec<ConfigChange>) -> Option<ActionOp>,
    D: Fn(&T, &T) -> Option<ActionOp>,
{
    let mut out = Reconciled::default();

    for entry in diff.creates {
        out.upserts.push(PlanAction::new(
            create(entry),
            format!("{label} {} is declared but missing", entry.key()),
        ));
    }

    for (entry, existing, changes) in diff.updates {
        let reason = format!("{label} {} drifted: {}", entry.key(), describe(&changes));
        match update(entry, existing, changes) {
            Some(op) => out.upserts.push(PlanAction::new(op, reason)),
            None => log::debug!("Left {label} {} as is ({reason})", entry.key()),
        }
    }

    for (entry, existing) in diff.deletes {
        match delete(entry, existing) {
            Some(op) => out.deletes.push(PlanAction::new(
                op,
                format!("{label} {} is marked absent", entry.key()),
            )),
            None => log::warn!("Skipping delete of {label} {}: no server id", entry.key()),
        }
    }

    out
}

/// Append upserts in dependency order and deletes in reverse
fn place(parts: Vec<Reconciled>, upserts: &mut Vec<PlanAction>, deletes: &mut Vec<PlanAction>) {
    let mut delete_groups = Vec::with_capacity(parts.len());
    for part in parts {
        upserts.extend(part.upserts);
        delete_groups.push(part.deletes);
    }
    for group in delete_groups.into_iter().rev() {
        deletes.extend(group);
    }
}

pub(super) fn plan_access(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let (d, c) = (ctx.desired, ctx.current);

    let roles = reconcile(
        diff_keyed(&d.roles, &c.roles, &[]),
        "role",
        |role| ActionOp::CreateRole { role: role.clone() },
        |role, _, changes| {
            Some(ActionOp::UpdateRole {
                role: role.clone(),
                changes,
            })
        },
        |role, _| {
            Some(ActionOp::DeleteRole {
                roleid: role.roleid.clone(),
            })
        },
    );

    let groups = reconcile(
        diff_keyed(&d.groups, &c.groups, &[]),
        "group",
        |group| ActionOp::CreateGroup {
            group: group.clone(),
        },
        |group, _, changes| {
            Some(ActionOp::UpdateGroup {
                group: group.clone(),
                changes,
            })
        },
        |group, _| {
            Some(ActionOp::DeleteGroup {
                groupid: group.groupid.clone(),
            })
        },
    );

    let users = reconcile(
        diff_keyed(&d.users, &c.users, &[]),
        "user",
        |user| ActionOp::CreateUser { user: user.clone() },
        |user, _, changes| {
            Some(ActionOp::UpdateUser {
                user: user.clone(),
                changes,
            })
        },
        |user, _| {
            Some(ActionOp::DeleteUser {
                userid: user.userid.clone(),
            })
        },
    );

    let tokens = reconcile(
        diff_keyed(&d.tokens, &c.tokens, &[]),
        "token",
        |token| ActionOp::CreateToken {
            token: token.clone(),
        },
        |token, _, changes| {
            Some(ActionOp::UpdateToken {
                token: token.clone(),
                changes,
            })
        },
        |token, _| {
            Some(ActionOp::DeleteToken {
                userid: token.userid.clone(),
                tokenid: token.tokenid.clone(),
            })
        },
    );

    let pools = reconcile(
        diff_keyed(&d.pools, &c.pools, &[]),
        "pool",
        |pool| ActionOp::CreatePool { pool: pool.clone() },
        |pool, _, changes| {
            Some(ActionOp::UpdatePool {
                pool: pool.clone(),
                changes,
            })
        },
        |pool, _| {
            Some(ActionOp::DeletePool {
                poolid: pool.poolid.clone(),
            })
        },
    );

    // A changed ACL (only `propagate` can differ) is granted again
    let acls = reconcile(
        diff_keyed(&d.acls, &c.acls, &[]),
        "acl",
        |acl| ActionOp::GrantAcl { acl: acl.clone() },
        |acl, _, _| Some(ActionOp::GrantAcl { acl: acl.clone() }),
        |_, existing| {
            Some(ActionOp::RevokeAcl {
                acl: existing.clone(),
            })
        },
    );

    place(
        vec![roles, groups, users, tokens, pools, acls],
        &mut phases.access,
        &mut phases.access_deletes,
    );
}

pub(super) fn plan_network(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let (d, c) = (ctx.desired, ctx.current);

    let networks = reconcile(
        diff_keyed(&d.networks, &c.networks, &[]),
        "network",
        |network| ActionOp::CreateNetwork {
            network: network.clone(),
        },
        |network, _, changes| {
            Some(ActionOp::UpdateNetwork {
                network: network.clone(),
                changes,
            })
        },
        |network, _| {
            Some(ActionOp::DeleteNetwork {
                node: network.node.clone(),
                iface: network.iface.clone(),
            })
        },
    );
    let upsert_nodes = touched_nodes(&networks.upserts);
    let delete_nodes = touched_nodes(&networks.deletes);

    let zones = reconcile(
        diff_keyed(&d.sdn_zones, &c.sdn_zones, &[]),
        "SDN zone",
        |zone| ActionOp::CreateSdnZone { zone: zone.clone() },
        |zone, _, changes| {
            Some(ActionOp::UpdateSdnZone {
                zone: zone.clone(),
                changes,
            })
        },
        |zone, _| {
            Some(ActionOp::DeleteSdnZone {
                zone: zone.zone.clone(),
            })
        },
    );

    let vnets = reconcile(
        diff_keyed(&d.sdn_vnets, &c.sdn_vnets, &[]),
        "SDN vnet",
        |vnet| ActionOp::CreateSdnVnet { vnet: vnet.clone() },
        |vnet, _, changes| {
            Some(ActionOp::UpdateSdnVnet {
                vnet: vnet.clone(),
                changes,
            })
        },
        |vnet, _| {
            Some(ActionOp::DeleteSdnVnet {
                vnet: vnet.vnet.clone(),
            })
        },
    );

    let subnets = reconcile(
        diff_keyed(&d.sdn_subnets, &c.sdn_subnets, &[]),
        "SDN subnet",
        |subnet| ActionOp::CreateSdnSubnet {
            subnet: subnet.clone(),
        },
        |subnet, _, changes| {
            Some(ActionOp::UpdateSdnSubnet {
                subnet: subnet.clone(),
                changes,
            })
        },
        |subnet, _| {
            Some(ActionOp::DeleteSdnSubnet {
                vnet: subnet.vnet.clone(),
                subnet: subnet.subnet.clone(),
            })
        },
    );

    let mut upserts = Vec::new();
    let mut deletes = Vec::new();

    // Interfaces, each touched node reloaded once
    place(vec![networks], &mut upserts, &mut deletes);
    upserts.extend(reload_actions(&upsert_nodes));
    deletes.extend(reload_actions(&delete_nodes));

    // SDN, applied once per batch
    let mut sdn_upserts = Vec::new();
    let mut sdn_deletes = Vec::new();
    place(vec![zones, vnets, subnets], &mut sdn_upserts, &mut sdn_deletes);
    if !sdn_upserts.is_empty() {
        sdn_upserts.push(apply_sdn());
    }
    if !sdn_deletes.is_empty() {
        sdn_deletes.push(apply_sdn());
    }

    // SDN deletes run before interface deletes; vnets may sit on a bridge
    upserts.extend(sdn_upserts);
    sdn_deletes.extend(deletes);

    phases.network.extend(upserts);
    phases.network_deletes.extend(sdn_deletes);
}

fn touched_nodes(actions: &[PlanAction]) -> BTreeSet<String> {
    actions
        .iter()
        .filter_map(|a| match &a.op {
            ActionOp::CreateNetwork { network } | ActionOp::UpdateNetwork { network, .. } => {
                Some(network.node.clone())
            }
            ActionOp::DeleteNetwork { node, .. } => Some(node.clone()),
            _ => None,
        })
        .collect()
}

fn reload_actions(nodes: &BTreeSet<String>) -> Vec<PlanAction> {
    nodes
        .iter()
        .map(|node| {
            PlanAction::new(
                ActionOp::ReloadNetwork { node: node.clone() },
                format!("network configuration on {node} changed"),
            )
        })
        .collect()
}

fn apply_sdn() -> PlanAction {
    PlanAction::new(ActionOp::ApplySdn {}, "SDN configuration changed")
}

pub(super) fn plan_storage(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let (d, c) = (ctx.desired, ctx.current);

    // Pools cannot be reshaped in place; drift is reported by preflight
    let pools = reconcile(
        diff_keyed(&d.storage_pools, &c.storage_pools, &[]),
        "storage pool",
        |pool| ActionOp::CreateStoragePool { pool: pool.clone() },
        |_, _, _| None,
        |pool, _| {
            Some(ActionOp::DeleteStoragePool {
                node: pool.node.clone(),
                name: pool.name.clone(),
                pool_type: pool.pool_type,
            })
        },
    );

    let storages = reconcile(
        diff_keyed(&d.storages, &c.storages, &[]),
        "storage",
        |storage| ActionOp::CreateStorage {
            storage: storage.clone(),
        },
        |storage, _, changes| {
            Some(ActionOp::UpdateStorage {
                storage: storage.clone(),
                changes,
            })
        },
        |storage, _| {
            Some(ActionOp::DeleteStorage {
                storage: storage.storage.clone(),
            })
        },
    );

    place(
        vec![pools, storages],
        &mut phases.storage,
        &mut phases.storage_deletes,
    );
}

pub(super) fn plan_cluster_services(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let (d, c) = (ctx.desired, ctx.current);

    let backup_jobs = reconcile(
        diff_keyed(&d.backup_jobs, &c.backup_jobs, &[]),
        "backup job",
        |job| ActionOp::CreateBackupJob { job: job.clone() },
        |job, _, changes| {
            Some(ActionOp::UpdateBackupJob {
                job: job.clone(),
                changes,
            })
        },
        |job, _| Some(ActionOp::DeleteBackupJob { id: job.id.clone() }),
    );

    let replication_jobs = reconcile(
        diff_keyed(&d.replication_jobs, &c.replication_jobs, &[]),
        "replication job",
        |job| ActionOp::CreateReplicationJob { job: job.clone() },
        |job, _, changes| {
            Some(ActionOp::UpdateReplicationJob {
                job: job.clone(),
                changes,
            })
        },
        |job, _| Some(ActionOp::DeleteReplicationJob { id: job.id.clone() }),
    );

    let ha_groups = reconcile(
        diff_keyed(&d.ha_groups, &c.ha_groups, &[]),
        "HA group",
        |group| ActionOp::CreateHaGroup {
            group: group.clone(),
        },
        |group, _, changes| {
            Some(ActionOp::UpdateHaGroup {
                group: group.clone(),
                changes,
            })
        },
        |group, _| {
            Some(ActionOp::DeleteHaGroup {
                group: group.group.clone(),
            })
        },
    );

    let ha_resources = reconcile(
        diff_keyed(&d.ha_resources, &c.ha_resources, &[]),
        "HA resource",
        |resource| ActionOp::CreateHaResource {
            resource: resource.clone(),
        },
        |resource, _, changes| {
            Some(ActionOp::UpdateHaResource {
                resource: resource.clone(),
                changes,
            })
        },
        |resource, _| {
            Some(ActionOp::DeleteHaResource {
                sid: resource.sid.clone(),
            })
        },
    );

    place(
        vec![backup_jobs, replication_jobs, ha_groups, ha_resources],
        &mut phases.cluster,
        &mut phases.cluster_deletes,
    );
}

pub(super) fn plan_applications(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let (d, c) = (ctx.desired, ctx.current);

    let stacks = plan_stacks(ctx);

    let folders = reconcile(
        diff_by(&d.folders, &c.folders, &["uid"], |want, have| {
            match &want.uid {
                Some(uid) => have.uid.as_ref() == Some(uid),
                None => have.title == want.title,
            }
        }),
        "folder",
        |folder| ActionOp::CreateFolder {
            folder: folder.clone(),
        },
        |folder, existing, changes| {
            Some(ActionOp::UpdateFolder {
                uid: existing.uid.clone().or_else(|| folder.uid.clone())?,
                folder: folder.clone(),
                changes,
            })
        },
        |folder, _| {
            Some(ActionOp::DeleteFolder {
                uid: folder.uid.clone()?,
            })
        },
    );

    let datasources = reconcile(
        diff_keyed(&d.datasources, &c.datasources, &["uid"]),
        "datasource",
        |datasource| ActionOp::CreateDatasource {
            datasource: datasource.clone(),
        },
        |datasource, existing, changes| {
            Some(ActionOp::UpdateDatasource {
                uid: existing.uid.clone().or_else(|| datasource.uid.clone())?,
                datasource: datasource.clone(),
                changes,
            })
        },
        |datasource, _| {
            Some(ActionOp::DeleteDatasource {
                uid: datasource.uid.clone()?,
                name: datasource.name.clone(),
            })
        },
    );

    let dashboards = reconcile(
        diff_by(&d.dashboards, &c.dashboards, &["uid"], |want, have| {
            match &want.uid {
                Some(uid) => have.uid.as_ref() == Some(uid),
                None => have.title == want.title,
            }
        }),
        "dashboard",
        |dashboard| ActionOp::CreateDashboard {
            dashboard: dashboard.clone(),
        },
        |dashboard, existing, changes| {
            Some(ActionOp::UpdateDashboard {
                uid: existing.uid.clone().or_else(|| dashboard.uid.clone())?,
                dashboard: dashboard.clone(),
                changes,
            })
        },
        |dashboard, _| {
            Some(ActionOp::DeleteDashboard {
                uid: dashboard.uid.clone()?,
            })
        },
    );

    place(
        vec![stacks, folders, datasources, dashboards],
        &mut phases.apps,
        &mut phases.app_deletes,
    );
}

/// Stacks: a revision bump on an otherwise unchanged stack is a redeploy
fn plan_stacks(ctx: &PlanContext<'_>) -> Reconciled {
    let (d, c) = (ctx.desired, ctx.current);
    let diff = diff_keyed(&d.stacks, &c.stacks, &["id"]);

    let mut out = Reconciled::default();
    for stack in &diff.creates {
        out.upserts.push(PlanAction::new(
            ActionOp::CreateStack {
                stack: (*stack).clone(),
            },
            format!("stack {} is declared but missing", stack.key()),
        ));
    }

    for (stack, existing, changes) in diff.updates {
        let Some(id) = existing.id.or(stack.id) else {
            log::warn!("Skipping update of stack {}: no server id", stack.key());
            continue;
        };

        let only_revision = changes.iter().all(|c| c.path == "revision");
        let action = if only_revision {
            PlanAction::new(
                ActionOp::RedeployStack {
                    id,
                    endpoint_id: stack.endpoint_id,
                    name: stack.name.clone(),
                    revision: stack.revision.clone(),
                },
                format!(
                    "stack {} revision changed to {}",
                    stack.key(),
                    stack.revision.as_deref().unwrap_or("-")
                ),
            )
        } else {
            PlanAction::new(
                ActionOp::UpdateStack {
                    id,
                    stack: stack.clone(),
                    changes: changes.clone(),
                },
                format!("stack {} drifted: {}", stack.key(), describe(&changes)),
            )
        };
        out.upserts.push(action);
    }

    for (stack, _) in diff.deletes {
        match stack.id {
            Some(id) => out.deletes.push(PlanAction::new(
                ActionOp::DeleteStack {
                    id,
                    endpoint_id: stack.endpoint_id,
                    name: stack.name.clone(),
                },
                format!("stack {} is marked absent", stack.key()),
            )),
            None => log::warn!("Skipping delete of stack {}: no server id", stack.key()),
        }
    }

    out
}

pub(super) fn plan_firewall(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let (d, c) = (ctx.desired, ctx.current);

    let aliases = reconcile(
        diff_keyed(&d.firewall_aliases, &c.firewall_aliases, &[]),
        "firewall alias",
        |alias| ActionOp::CreateFirewallAlias {
            alias: alias.clone(),
        },
        |alias, _, changes| {
            Some(ActionOp::UpdateFirewallAlias {
                alias: alias.clone(),
                changes,
            })
        },
        |alias, _| {
            Some(ActionOp::DeleteFirewallAlias {
                name: alias.name.clone(),
            })
        },
    );

    let rules = reconcile(
        diff_keyed(&d.firewall_rules, &c.firewall_rules, &[]),
        "firewall rule",
        |rule| ActionOp::CreateFirewallRule { rule: rule.clone() },
        |rule, _, changes| {
            Some(ActionOp::UpdateFirewallRule {
                rule: rule.clone(),
                changes,
            })
        },
        |_, existing| {
            Some(ActionOp::DeleteFirewallRule {
                rule: existing.clone(),
            })
        },
    );

    place(
        vec![aliases, rules],
        &mut phases.firewall,
        &mut phases.firewall_deletes,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ActionKind, CurrentState, DesiredSpec, Ensure, NetworkSpec, SdnZoneSpec, StackSpec,
    };
    use crate::planner::CapacityPolicy;
    use chrono::Utc;

    fn network(node: &str, iface: &str, ensure: Ensure) -> NetworkSpec {
        NetworkSpec {
            node: node.into(),
            iface: iface.into(),
            ensure,
            iface_type: Some("bridge".into()),
            cidr: None,
            gateway: None,
            bridge_ports: None,
            bridge_vlan_aware: None,
            autostart: Some(true),
            comments: None,
        }
    }

    fn run(
        current: &CurrentState,
        desired: &DesiredSpec,
        f: fn(&PlanContext<'_>, &mut Phases),
    ) -> Vec<PlanAction> {
        let capacity = CapacityPolicy::default();
        let ctx = PlanContext {
            current,
            desired,
            capacity: &capacity,
            now: Utc::now(),
        };
        let mut phases = Phases::default();
        f(&ctx, &mut phases);
        phases.into_actions()
    }

    fn kinds(actions: &[PlanAction]) -> Vec<ActionKind> {
        actions.iter().map(PlanAction::kind).collect()
    }

    #[test]
    fn test_network_reload_once_per_node() {
        let desired = DesiredSpec {
            networks: vec![
                network("pve1", "vmbr1", Ensure::Present),
                network("pve1", "vmbr2", Ensure::Present),
                network("pve2", "vmbr1", Ensure::Present),
            ],
            ..Default::default()
        };

        let actions = run(&CurrentState::default(), &desired, plan_network);
        assert_eq!(
            kinds(&actions),
            vec![
                ActionKind::CreateNetwork,
                ActionKind::CreateNetwork,
                ActionKind::CreateNetwork,
                ActionKind::ReloadNetwork,
                ActionKind::ReloadNetwork,
            ]
        );
    }

    #[test]
    fn test_sdn_deletes_precede_interface_deletes() {
        let zone = SdnZoneSpec {
            zone: "z1".into(),
            ensure: Ensure::Absent,
            zone_type: None,
            bridge: None,
            mtu: None,
            nodes: None,
        };
        let desired = DesiredSpec {
            networks: vec![network("pve1", "vmbr9", Ensure::Absent)],
            sdn_zones: vec![zone.clone()],
            ..Default::default()
        };
        let current = CurrentState {
            networks: vec![network("pve1", "vmbr9", Ensure::Present)],
            sdn_zones: vec![SdnZoneSpec {
                ensure: Ensure::Present,
                ..zone
            }],
            ..Default::default()
        };

        let actions = run(&current, &desired, plan_network);
        assert_eq!(
            kinds(&actions),
            vec![
                ActionKind::DeleteSdnZone,
                ActionKind::ApplySdn,
                ActionKind::DeleteNetwork,
                ActionKind::ReloadNetwork,
            ]
        );
    }

    fn stack(revision: Option<&str>, compose: &str, id: Option<u64>) -> StackSpec {
        StackSpec {
            name: "web".into(),
            endpoint_id: 1,
            id,
            ensure: Ensure::Present,
            compose: Some(compose.into()),
            env: Default::default(),
            revision: revision.map(String::from),
        }
    }

    #[test]
    fn test_stack_revision_bump_redeploys() {
        let desired = DesiredSpec {
            stacks: vec![stack(Some("2"), "services: {}", None)],
            ..Default::default()
        };
        let current = CurrentState {
            stacks: vec![stack(Some("1"), "services: {}", Some(12))],
            ..Default::default()
        };

        let actions = run(&current, &desired, plan_applications);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].op,
            ActionOp::RedeployStack {
                id: 12,
                endpoint_id: 1,
                name: "web".into(),
                revision: Some("2".into()),
            }
        );
    }

    #[test]
    fn test_stack_compose_change_updates() {
        let desired = DesiredSpec {
            stacks: vec![stack(Some("2"), "services: {app: {}}", None)],
            ..Default::default()
        };
        let current = CurrentState {
            stacks: vec![stack(Some("1"), "services: {}", Some(12))],
            ..Default::default()
        };

        let actions = run(&current, &desired, plan_applications);
        assert_eq!(kinds(&actions), vec![ActionKind::UpdateStack]);
        assert!(actions[0].reason.contains("compose"));
    }

    #[test]
    fn test_absent_stack_without_id_is_not_deleted() {
        let mut absent = stack(None, "x", None);
        absent.ensure = Ensure::Absent;
        let desired = DesiredSpec {
            stacks: vec![absent],
            ..Default::default()
        };
        let current = CurrentState {
            stacks: vec![stack(None, "x", Some(4))],
            ..Default::default()
        };

        assert!(run(&current, &desired, plan_applications).is_empty());
    }
}
