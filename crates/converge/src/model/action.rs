//! Plan actions: a closed sum type with one variant per action kind

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumDiscriminants;

use super::access::{AclSpec, GroupSpec, PoolSpec, RoleSpec, TokenSpec, UserSpec};
use super::apps::{CrudSpec, DashboardSpec, DatasourceSpec, FolderSpec, StackSpec};
use super::cluster::{
    BackupJobSpec, FirewallAliasSpec, FirewallRuleSpec, HaGroupSpec, HaResourceSpec, NetworkSpec,
    ReplicationJobSpec, SdnSubnetSpec, SdnVnetSpec, SdnZoneSpec, StoragePoolSpec,
    StoragePoolType, StorageSpec,
};
use super::compute::{BackupMode, CtSpec, DiskSpec, GuestKind, VmSpec};
use super::{Declared, is_false};

/// One field-level drift on an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    pub path: String,
    pub old_value: Value,
    pub new_value: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_reboot: bool,
}

impl ConfigChange {
    pub fn new(path: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self {
            path: path.into(),
            old_value,
            new_value,
            requires_reboot: false,
        }
    }

    pub fn with_reboot(mut self, requires_reboot: bool) -> Self {
        self.requires_reboot = requires_reboot;
        self
    }
}

/// Which provider executes an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Hypervisor,
    Containers,
    Observability,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Hypervisor => write!(f, "hypervisor"),
            Backend::Containers => write!(f, "containers"),
            Backend::Observability => write!(f, "observability"),
        }
    }
}

/// The typed operation of a plan action
///
/// The variant (serialized as `kind`) fixes the required fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumDiscriminants)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum_discriminants(name(ActionKind))]
#[strum_discriminants(derive(
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
    strum::IntoStaticStr
))]
#[strum_discriminants(strum(serialize_all = "snake_case"))]
#[strum_discriminants(serde(rename_all = "snake_case"))]
pub enum ActionOp {
    // Identity and access
    CreateUser { user: UserSpec },
    UpdateUser { user: UserSpec, changes: Vec<ConfigChange> },
    DeleteUser { userid: String },
    CreateGroup { group: GroupSpec },
    UpdateGroup { group: GroupSpec, changes: Vec<ConfigChange> },
    DeleteGroup { groupid: String },
    CreateRole { role: RoleSpec },
    UpdateRole { role: RoleSpec, changes: Vec<ConfigChange> },
    DeleteRole { roleid: String },
    GrantAcl { acl: AclSpec },
    RevokeAcl { acl: AclSpec },
    CreateToken { token: TokenSpec },
    UpdateToken { token: TokenSpec, changes: Vec<ConfigChange> },
    DeleteToken { userid: String, tokenid: String },
    CreatePool { pool: PoolSpec },
    UpdatePool { pool: PoolSpec, changes: Vec<ConfigChange> },
    DeletePool { poolid: String },

    // Networking
    CreateNetwork { network: NetworkSpec },
    UpdateNetwork { network: NetworkSpec, changes: Vec<ConfigChange> },
    DeleteNetwork { node: String, iface: String },
    ReloadNetwork { node: String },
    CreateSdnZone { zone: SdnZoneSpec },
    UpdateSdnZone { zone: SdnZoneSpec, changes: Vec<ConfigChange> },
    DeleteSdnZone { zone: String },
    CreateSdnVnet { vnet: SdnVnetSpec },
    UpdateSdnVnet { vnet: SdnVnetSpec, changes: Vec<ConfigChange> },
    DeleteSdnVnet { vnet: String },
    CreateSdnSubnet { subnet: SdnSubnetSpec },
    UpdateSdnSubnet { subnet: SdnSubnetSpec, changes: Vec<ConfigChange> },
    DeleteSdnSubnet { vnet: String, subnet: String },
    ApplySdn {},

    // Storage
    CreateStorage { storage: StorageSpec },
    UpdateStorage { storage: StorageSpec, changes: Vec<ConfigChange> },
    DeleteStorage { storage: String },
    CreateStoragePool { pool: StoragePoolSpec },
    DeleteStoragePool { node: String, name: String, pool_type: StoragePoolType },

    // Virtual machines
    CreateVm { vm: VmSpec },
    CloneVm {
        node: String,
        source: u32,
        vmid: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_storage: Option<String>,
        full: bool,
    },
    UpdateVmConfig { node: String, vmid: u32, changes: Vec<ConfigChange> },
    RebootVm { node: String, vmid: u32 },
    AttachDisk { node: String, vmid: u32, disk: DiskSpec },
    DetachDisk { node: String, vmid: u32, disk: String },
    ResizeDisk { node: String, vmid: u32, disk: String, size: String },
    MoveDisk {
        node: String,
        vmid: u32,
        disk: String,
        target_storage: String,
        delete_source: bool,
    },
    CopyVolume {
        node: String,
        volume: String,
        source_storage: String,
        target_storage: String,
    },
    StartVm { node: String, vmid: u32 },
    StopVm { node: String, vmid: u32 },
    ResumeVm { node: String, vmid: u32 },
    DeleteVm { node: String, vmid: u32, purge: bool },

    // Containers
    CreateCt { ct: CtSpec },
    UpdateCtConfig { node: String, vmid: u32, changes: Vec<ConfigChange> },
    RebootCt { node: String, vmid: u32 },
    ResizeCtDisk { node: String, vmid: u32, disk: String, size: String },
    StartCt { node: String, vmid: u32 },
    StopCt { node: String, vmid: u32 },
    DeleteCt { node: String, vmid: u32, purge: bool },

    // Guest operations
    CreateSnapshot {
        guest: GuestKind,
        node: String,
        vmid: u32,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        include_ram: bool,
    },
    DeleteSnapshot { guest: GuestKind, node: String, vmid: u32, name: String },
    MigrateGuest { guest: GuestKind, node: String, vmid: u32, target: String, online: bool },
    BackupGuest { guest: GuestKind, node: String, vmid: u32, storage: String, mode: BackupMode },
    RestoreGuest {
        guest: GuestKind,
        node: String,
        vmid: u32,
        archive: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        storage: Option<String>,
        force: bool,
    },

    // Cluster services
    CreateBackupJob { job: BackupJobSpec },
    UpdateBackupJob { job: BackupJobSpec, changes: Vec<ConfigChange> },
    DeleteBackupJob { id: String },
    CreateReplicationJob { job: ReplicationJobSpec },
    UpdateReplicationJob { job: ReplicationJobSpec, changes: Vec<ConfigChange> },
    DeleteReplicationJob { id: String },
    CreateHaGroup { group: HaGroupSpec },
    UpdateHaGroup { group: HaGroupSpec, changes: Vec<ConfigChange> },
    DeleteHaGroup { group: String },
    CreateHaResource { resource: HaResourceSpec },
    UpdateHaResource { resource: HaResourceSpec, changes: Vec<ConfigChange> },
    DeleteHaResource { sid: String },

    // Firewall
    CreateFirewallRule { rule: FirewallRuleSpec },
    UpdateFirewallRule { rule: FirewallRuleSpec, changes: Vec<ConfigChange> },
    DeleteFirewallRule { rule: FirewallRuleSpec },
    CreateFirewallAlias { alias: FirewallAliasSpec },
    UpdateFirewallAlias { alias: FirewallAliasSpec, changes: Vec<ConfigChange> },
    DeleteFirewallAlias { name: String },

    // Nodes
    RebootNode {
        node: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    ShutdownNode {
        node: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    // Container workloads
    CreateStack { stack: StackSpec },
    UpdateStack { id: u64, stack: StackSpec, changes: Vec<ConfigChange> },
    RedeployStack {
        id: u64,
        endpoint_id: u64,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
    DeleteStack { id: u64, endpoint_id: u64, name: String },

    // Observability
    CreateFolder { folder: FolderSpec },
    UpdateFolder { uid: String, folder: FolderSpec, changes: Vec<ConfigChange> },
    DeleteFolder { uid: String },
    CreateDatasource { datasource: DatasourceSpec },
    UpdateDatasource { uid: String, datasource: DatasourceSpec, changes: Vec<ConfigChange> },
    DeleteDatasource { uid: String, name: String },
    CreateDashboard { dashboard: DashboardSpec },
    UpdateDashboard { uid: String, dashboard: DashboardSpec, changes: Vec<ConfigChange> },
    DeleteDashboard { uid: String },

    // Ad hoc passthrough
    HypervisorRequest { request: CrudSpec },
    ContainerRequest { request: CrudSpec },
    ObservabilityRequest { request: CrudSpec },
}

impl ActionOp {
    pub fn kind(&self) -> ActionKind {
        ActionKind::from(self)
    }

    /// Provider responsible for this operation
    pub fn backend(&self) -> Backend {
        match self {
            Self::CreateStack { .. }
            | Self::UpdateStack { .. }
            | Self::RedeployStack { .. }
            | Self::DeleteStack { .. }
            | Self::ContainerRequest { .. } => Backend::Containers,
            Self::CreateFolder { .. }
            | Self::UpdateFolder { .. }
            | Self::DeleteFolder { .. }
            | Self::CreateDatasource { .. }
            | Self::UpdateDatasource { .. }
            | Self::DeleteDatasource { .. }
            | Self::CreateDashboard { .. }
            | Self::UpdateDashboard { .. }
            | Self::DeleteDashboard { .. }
            | Self::ObservabilityRequest { .. } => Backend::Observability,
            _ => Backend::Hypervisor,
        }
    }

    /// Human-readable address of the object the operation touches
    pub fn target(&self) -> String {
        match self {
            Self::CreateUser { user } | Self::UpdateUser { user, .. } => {
                format!("access/users/{}", user.userid)
            }
            Self::DeleteUser { userid } => format!("access/users/{userid}"),
            Self::CreateGroup { group } | Self::UpdateGroup { group, .. } => {
                format!("access/groups/{}", group.groupid)
            }
            Self::DeleteGroup { groupid } => format!("access/groups/{groupid}"),
            Self::CreateRole { role } | Self::UpdateRole { role, .. } => {
                format!("access/roles/{}", role.roleid)
            }
            Self::DeleteRole { roleid } => format!("access/roles/{roleid}"),
            Self::GrantAcl { acl } | Self::RevokeAcl { acl } => {
                format!("access/acl{} ({} as {})", acl.path, acl.ugid, acl.roleid)
            }
            Self::CreateToken { token } | Self::UpdateToken { token, .. } => {
                format!("access/users/{}/token/{}", token.userid, token.tokenid)
            }
            Self::DeleteToken { userid, tokenid } => {
                format!("access/users/{userid}/token/{tokenid}")
            }
            Self::CreatePool { pool } | Self::UpdatePool { pool, .. } => {
                format!("pools/{}", pool.poolid)
            }
            Self::DeletePool { poolid } => format!("pools/{poolid}"),
            Self::CreateNetwork { network } | Self::UpdateNetwork { network, .. } => {
                format!("nodes/{}/network/{}", network.node, network.iface)
            }
            Self::DeleteNetwork { node, iface } => format!("nodes/{node}/network/{iface}"),
            Self::ReloadNetwork { node } => format!("nodes/{node}/network"),
            Self::CreateSdnZone { zone } | Self::UpdateSdnZone { zone, .. } => {
                format!("cluster/sdn/zones/{}", zone.zone)
            }
            Self::DeleteSdnZone { zone } => format!("cluster/sdn/zones/{zone}"),
            Self::CreateSdnVnet { vnet } | Self::UpdateSdnVnet { vnet, .. } => {
                format!("cluster/sdn/vnets/{}", vnet.vnet)
            }
            Self::DeleteSdnVnet { vnet } => format!("cluster/sdn/vnets/{vnet}"),
            Self::CreateSdnSubnet { subnet } | Self::UpdateSdnSubnet { subnet, .. } => {
                format!("cluster/sdn/vnets/{}/subnets/{}", subnet.vnet, subnet.subnet)
            }
            Self::DeleteSdnSubnet { vnet, subnet } => {
                format!("cluster/sdn/vnets/{vnet}/subnets/{subnet}")
            }
            Self::ApplySdn {} => "cluster/sdn".to_string(),
            Self::CreateStorage { storage } | Self::UpdateStorage { storage, .. } => {
                format!("storage/{}", storage.storage)
            }
            Self::DeleteStorage { storage } => format!("storage/{storage}"),
            Self::CreateStoragePool { pool } => format!("nodes/{}/disks/{}", pool.node, pool.name),
            Self::DeleteStoragePool { node, name, .. } => format!("nodes/{node}/disks/{name}"),
            Self::CreateVm { vm } => format!("nodes/{}/qemu/{}", vm.node, vm.vmid),
            Self::CloneVm { node, vmid, .. }
            | Self::UpdateVmConfig { node, vmid, .. }
            | Self::RebootVm { node, vmid }
            | Self::StartVm { node, vmid }
            | Self::StopVm { node, vmid }
            | Self::ResumeVm { node, vmid }
            | Self::DeleteVm { node, vmid, .. } => format!("nodes/{node}/qemu/{vmid}"),
            Self::AttachDisk { node, vmid, disk } => {
                format!("nodes/{node}/qemu/{vmid}/{}", disk.key())
            }
            Self::DetachDisk { node, vmid, disk }
            | Self::ResizeDisk { node, vmid, disk, .. }
            | Self::MoveDisk { node, vmid, disk, .. } => format!("nodes/{node}/qemu/{vmid}/{disk}"),
            Self::CopyVolume {
                node,
                volume,
                target_storage,
                ..
            } => format!("nodes/{node}/storage/{target_storage}/{volume}"),
            Self::CreateCt { ct } => format!("nodes/{}/lxc/{}", ct.node, ct.vmid),
            Self::UpdateCtConfig { node, vmid, .. }
            | Self::RebootCt { node, vmid }
            | Self::StartCt { node, vmid }
            | Self::StopCt { node, vmid }
            | Self::DeleteCt { node, vmid, .. } => format!("nodes/{node}/lxc/{vmid}"),
            Self::ResizeCtDisk {
                node, vmid, disk, ..
            } => format!("nodes/{node}/lxc/{vmid}/{disk}"),
            Self::CreateSnapshot {
                guest,
                node,
                vmid,
                name,
                ..
            }
            | Self::DeleteSnapshot {
                guest,
                node,
                vmid,
                name,
            } => format!("nodes/{node}/{}/{vmid}/snapshot/{name}", guest_path(*guest)),
            Self::MigrateGuest {
                guest, node, vmid, ..
            }
            | Self::BackupGuest {
                guest, node, vmid, ..
            }
            | Self::RestoreGuest {
                guest, node, vmid, ..
            } => format!("nodes/{node}/{}/{vmid}", guest_path(*guest)),
            Self::CreateBackupJob { job } | Self::UpdateBackupJob { job, .. } => {
                format!("cluster/backup/{}", job.id)
            }
            Self::DeleteBackupJob { id } => format!("cluster/backup/{id}"),
            Self::CreateReplicationJob { job } | Self::UpdateReplicationJob { job, .. } => {
                format!("cluster/replication/{}", job.id)
            }
            Self::DeleteReplicationJob { id } => format!("cluster/replication/{id}"),
            Self::CreateHaGroup { group } | Self::UpdateHaGroup { group, .. } => {
                format!("cluster/ha/groups/{}", group.group)
            }
            Self::DeleteHaGroup { group } => format!("cluster/ha/groups/{group}"),
            Self::CreateHaResource { resource } | Self::UpdateHaResource { resource, .. } => {
                format!("cluster/ha/resources/{}", resource.sid)
            }
            Self::DeleteHaResource { sid } => format!("cluster/ha/resources/{sid}"),
            Self::CreateFirewallRule { rule }
            | Self::UpdateFirewallRule { rule, .. }
            | Self::DeleteFirewallRule { rule } => format!("firewall/rules/{}", rule.key()),
            Self::CreateFirewallAlias { alias } | Self::UpdateFirewallAlias { alias, .. } => {
                format!("cluster/firewall/aliases/{}", alias.name)
            }
            Self::DeleteFirewallAlias { name } => format!("cluster/firewall/aliases/{name}"),
            Self::RebootNode { node, .. } | Self::ShutdownNode { node, .. } => {
                format!("nodes/{node}/status")
            }
            Self::CreateStack { stack } => {
                format!("endpoints/{}/stacks/{}", stack.endpoint_id, stack.name)
            }
            Self::UpdateStack { stack, .. } => {
                format!("endpoints/{}/stacks/{}", stack.endpoint_id, stack.name)
            }
            Self::RedeployStack {
                endpoint_id, name, ..
            }
            | Self::DeleteStack {
                endpoint_id, name, ..
            } => format!("endpoints/{endpoint_id}/stacks/{name}"),
            Self::CreateFolder { folder } => format!("folders/{}", folder.title),
            Self::UpdateFolder { uid, .. } | Self::DeleteFolder { uid } => format!("folders/{uid}"),
            Self::CreateDatasource { datasource } => format!("datasources/{}", datasource.name),
            Self::UpdateDatasource { datasource, .. } => {
                format!("datasources/{}", datasource.name)
            }
            Self::DeleteDatasource { name, .. } => format!("datasources/{name}"),
            Self::CreateDashboard { dashboard } => format!("dashboards/{}", dashboard.title),
            Self::UpdateDashboard { uid, .. } | Self::DeleteDashboard { uid } => {
                format!("dashboards/{uid}")
            }
            Self::HypervisorRequest { request }
            | Self::ContainerRequest { request }
            | Self::ObservabilityRequest { request } => {
                format!("{} {}", request.method.to_uppercase(), request.path)
            }
        }
    }
}

fn guest_path(guest: GuestKind) -> &'static str {
    match guest {
        GuestKind::Vm => "qemu",
        GuestKind::Ct => "lxc",
    }
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// A typed operation plus the reason it was planned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAction {
    #[serde(flatten)]
    pub op: ActionOp,
    pub reason: String,
}

impl PlanAction {
    pub fn new(op: ActionOp, reason: impl Into<String>) -> Self {
        Self {
            op,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.op.kind()
    }
}

/// An ordered list of actions reconciling current state toward desired state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub generated_at: DateTime<Utc>,
    pub env: String,
    pub actions: Vec<PlanAction>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Content hash of the action list, independent of `generated_at`
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.actions).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Count actions per kind, in kind order
    pub fn kind_counts(&self) -> Vec<(ActionKind, usize)> {
        let mut counts: std::collections::BTreeMap<ActionKind, usize> =
            std::collections::BTreeMap::new();
        for action in &self.actions {
            *counts.entry(action.kind()).or_default() += 1;
        }
        counts.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_serializes_kind_and_reason_flat() {
        let action = PlanAction::new(
            ActionOp::StartVm {
                node: "pve1".into(),
                vmid: 101,
            },
            "VM 101 should be running",
        );
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(
            value,
            json!({"kind": "start_vm", "node": "pve1", "vmid": 101, "reason": "VM 101 should be running"})
        );

        let back: PlanAction = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_kind_names_match_serde_tags() {
        use strum::IntoEnumIterator;

        for kind in ActionKind::iter() {
            let name = kind.as_str();
            assert!(!name.is_empty());
            assert_eq!(name, name.to_lowercase(), "{name} should be snake_case");
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(name));
        }
        assert_eq!(ActionKind::CreateSdnZone.as_str(), "create_sdn_zone");
        assert_eq!(ActionKind::ApplySdn.to_string(), "apply_sdn");
    }

    #[test]
    fn test_fingerprint_ignores_timestamp() {
        let actions = vec![PlanAction::new(
            ActionOp::ReloadNetwork {
                node: "pve1".into(),
            },
            "network changed",
        )];
        let a = Plan {
            generated_at: Utc::now(),
            env: "prod".into(),
            actions: actions.clone(),
        };
        let b = Plan {
            generated_at: a.generated_at + chrono::Duration::hours(1),
            env: "prod".into(),
            actions,
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_backend_routing() {
        let stack = ActionOp::DeleteStack {
            id: 3,
            endpoint_id: 1,
            name: "web".into(),
        };
        assert_eq!(stack.backend(), Backend::Containers);
        let folder = ActionOp::DeleteFolder { uid: "ops".into() };
        assert_eq!(folder.backend(), Backend::Observability);
        let vm = ActionOp::StopVm {
            node: "pve1".into(),
            vmid: 100,
        };
        assert_eq!(vm.backend(), Backend::Hypervisor);
    }
}
