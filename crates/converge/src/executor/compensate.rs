//! Compensating actions for the rollback pass
//!
//! Coverage is partial on purpose: creations are undone by their delete and a
//! few toggles by their inverse. Updates, deletes, data-moving operations and
//! node operations have no compensation.

use serde_json::Value;

use crate::model::{ActionOp, PlanAction};

/// The action undoing `action`, given the provider output of its execution
pub(super) fn compensation(action: &PlanAction, output: Option<&Value>) -> Option<PlanAction> {
    let op = match &action.op {
        ActionOp::CreateUser { user } => ActionOp::DeleteUser {
            userid: user.userid.clone(),
        },
        ActionOp::CreateGroup { group } => ActionOp::DeleteGroup {
            groupid: group.groupid.clone(),
        },
        ActionOp::CreateRole { role } => ActionOp::DeleteRole {
            roleid: role.roleid.clone(),
        },
        ActionOp::GrantAcl { acl } => ActionOp::RevokeAcl { acl: acl.clone() },
        ActionOp::RevokeAcl { acl } => ActionOp::GrantAcl { acl: acl.clone() },
        ActionOp::CreateToken { token } => ActionOp::DeleteToken {
            userid: token.userid.clone(),
            tokenid: token.tokenid.clone(),
        },
        ActionOp::CreatePool { pool } => ActionOp::DeletePool {
            poolid: pool.poolid.clone(),
        },

        ActionOp::CreateNetwork { network } => ActionOp::DeleteNetwork {
            node: network.node.clone(),
            iface: network.iface.clone(),
        },
        ActionOp::CreateSdnZone { zone } => ActionOp::DeleteSdnZone {
            zone: zone.zone.clone(),
        },
        ActionOp::CreateSdnVnet { vnet } => ActionOp::DeleteSdnVnet {
            vnet: vnet.vnet.clone(),
        },
        ActionOp::CreateSdnSubnet { subnet } => ActionOp::DeleteSdnSubnet {
            vnet: subnet.vnet.clone(),
            subnet: subnet.subnet.clone(),
        },

        ActionOp::CreateStorage { storage } => ActionOp::DeleteStorage {
            storage: storage.storage.clone(),
        },
        ActionOp::CreateStoragePool { pool } => ActionOp::DeleteStoragePool {
            node: pool.node.clone(),
            name: pool.name.clone(),
            pool_type: pool.pool_type,
        },

        ActionOp::CreateVm { vm } => ActionOp::DeleteVm {
            node: vm.node.clone(),
            vmid: vm.vmid,
            purge: false,
        },
        ActionOp::CloneVm { node, vmid, .. } => ActionOp::DeleteVm {
            node: node.clone(),
            vmid: *vmid,
            purge: false,
        },
        ActionOp::AttachDisk { node, vmid, disk } => ActionOp::DetachDisk {
            node: node.clone(),
            vmid: *vmid,
            disk: disk.key(),
        },
        ActionOp::StartVm { node, vmid } => ActionOp::StopVm {
            node: node.clone(),
            vmid: *vmid,
        },
        ActionOp::StopVm { node, vmid } => ActionOp::StartVm {
            node: node.clone(),
            vmid: *vmid,
        },

        ActionOp::CreateCt { ct } => ActionOp::DeleteCt {
            node: ct.node.clone(),
            vmid: ct.vmid,
            purge: false,
        },
        ActionOp::StartCt { node, vmid } => ActionOp::StopCt {
            node: node.clone(),
            vmid: *vmid,
        },
        ActionOp::StopCt { node, vmid } => ActionOp::StartCt {
            node: node.clone(),
            vmid: *vmid,
        },

        ActionOp::CreateSnapshot {
            guest,
            node,
            vmid,
            name,
            ..
        } => ActionOp::DeleteSnapshot {
            guest: *guest,
            node: node.clone(),
            vmid: *vmid,
            name: name.clone(),
        },

        ActionOp::CreateBackupJob { job } => ActionOp::DeleteBackupJob { id: job.id.clone() },
        ActionOp::CreateReplicationJob { job } => {
            ActionOp::DeleteReplicationJob { id: job.id.clone() }
        }
        ActionOp::CreateHaGroup { group } => ActionOp::DeleteHaGroup {
            group: group.group.clone(),
        },
        ActionOp::CreateHaResource { resource } => ActionOp::DeleteHaResource {
            sid: resource.sid.clone(),
        },
        ActionOp::CreateFirewallRule { rule } => ActionOp::DeleteFirewallRule { rule: rule.clone() },
        ActionOp::CreateFirewallAlias { alias } => ActionOp::DeleteFirewallAlias {
            name: alias.name.clone(),
        },

        // Server-assigned ids come back in the provider output
        ActionOp::CreateStack { stack } => ActionOp::DeleteStack {
            id: output_id(output).or(stack.id)?,
            endpoint_id: stack.endpoint_id,
            name: stack.name.clone(),
        },
        ActionOp::CreateFolder { folder } => ActionOp::DeleteFolder {
            uid: output_uid(output).or_else(|| folder.uid.clone())?,
        },
        ActionOp::CreateDatasource { datasource } => ActionOp::DeleteDatasource {
            uid: output_uid(output).or_else(|| datasource.uid.clone())?,
            name: datasource.name.clone(),
        },
        ActionOp::CreateDashboard { dashboard } => ActionOp::DeleteDashboard {
            uid: output_uid(output).or_else(|| dashboard.uid.clone())?,
        },

        _ => return None,
    };

    let reason = format!("rollback of {} {}", action.kind(), action.op.target());
    Some(PlanAction::new(op, reason))
}

fn output_id(output: Option<&Value>) -> Option<u64> {
    let id = output?.get("id")?;
    id.as_u64().or_else(|| id.as_str()?.parse().ok())
}

fn output_uid(output: Option<&Value>) -> Option<String> {
    output?.get("uid")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionKind;
    use serde_json::json;

    fn action(value: Value) -> PlanAction {
        serde_json::from_value(value).unwrap()
    }

    fn undo_kind(value: Value, output: Option<Value>) -> Option<ActionKind> {
        compensation(&action(value), output.as_ref()).map(|a| a.kind())
    }

    #[test]
    fn test_creates_map_to_deletes() {
        let undo = compensation(
            &action(json!({"kind": "create_network", "network": {"node": "pve1", "iface": "vmbr1"}, "reason": "r"})),
            None,
        )
        .unwrap();
        assert_eq!(
            undo.op,
            ActionOp::DeleteNetwork {
                node: "pve1".into(),
                iface: "vmbr1".into()
            }
        );
        assert_eq!(undo.reason, "rollback of create_network nodes/pve1/network/vmbr1");

        assert_eq!(
            undo_kind(json!({"kind": "clone_vm", "node": "pve1", "source": 9000, "vmid": 120, "full": true, "reason": "r"}), None),
            Some(ActionKind::DeleteVm)
        );
    }

    #[test]
    fn test_inverse_pairs() {
        assert_eq!(
            undo_kind(json!({"kind": "start_vm", "node": "pve1", "vmid": 101, "reason": "r"}), None),
            Some(ActionKind::StopVm)
        );
        assert_eq!(
            undo_kind(json!({"kind": "stop_ct", "node": "pve1", "vmid": 201, "reason": "r"}), None),
            Some(ActionKind::StartCt)
        );

        let detach = compensation(
            &action(json!({"kind": "attach_disk", "node": "pve1", "vmid": 101,
                           "disk": {"interface": "scsi", "index": 1, "size": "32G"}, "reason": "r"})),
            None,
        )
        .unwrap();
        assert!(matches!(detach.op, ActionOp::DetachDisk { ref disk, .. } if disk == "scsi1"));
    }

    #[test]
    fn test_irreversible_kinds_have_no_compensation() {
        for value in [
            json!({"kind": "delete_vm", "node": "pve1", "vmid": 101, "purge": true, "reason": "r"}),
            json!({"kind": "update_vm_config", "node": "pve1", "vmid": 101, "changes": [], "reason": "r"}),
            json!({"kind": "reload_network", "node": "pve1", "reason": "r"}),
            json!({"kind": "resize_disk", "node": "pve1", "vmid": 101, "disk": "scsi0", "size": "64G", "reason": "r"}),
            json!({"kind": "hypervisor_request", "request": {"method": "get", "path": "/version"}, "reason": "r"}),
        ] {
            assert_eq!(undo_kind(value, None), None);
        }
    }

    #[test]
    fn test_server_ids_from_output() {
        let stack = json!({"kind": "create_stack", "stack": {"name": "web", "endpoint_id": 2}, "reason": "r"});
        assert_eq!(undo_kind(stack.clone(), None), None);
        let undo = compensation(&action(stack), Some(&json!({"id": 17}))).unwrap();
        assert_eq!(
            undo.op,
            ActionOp::DeleteStack {
                id: 17,
                endpoint_id: 2,
                name: "web".into()
            }
        );

        let folder = json!({"kind": "create_folder", "folder": {"title": "Infra"}, "reason": "r"});
        let undo = compensation(&action(folder), Some(&json!({"uid": "f-1", "title": "Infra"}))).unwrap();
        assert_eq!(undo.op, ActionOp::DeleteFolder { uid: "f-1".into() });
    }
}
