//! The operator-declared target state

use serde::{Deserialize, Serialize};

use super::access::{AclSpec, GroupSpec, PoolSpec, RoleSpec, TokenSpec, UserSpec};
use super::apps::{CrudSpec, DashboardSpec, DatasourceSpec, FolderSpec, StackSpec};
use super::cluster::{
    BackupJobSpec, FirewallAliasSpec, FirewallRuleSpec, HaGroupSpec, HaResourceSpec, NetworkSpec,
    NodeActionSpec, ReplicationJobSpec, SdnSubnetSpec, SdnVnetSpec, SdnZoneSpec, StoragePoolSpec,
    StorageSpec,
};
use super::compute::{
    BackupSpec, CtSpec, DeleteSpec, DiskMoveSpec, MigrationSpec, RestoreSpec, SnapshotSpec,
    VmSpec, VolumeCopySpec,
};

/// Desired state across every managed domain
///
/// Domains are independent arrays. The structure is assumed to be schema-valid;
/// semantic problems (duplicates, conflicts, missing confirmations) are reported
/// by preflight, never silently merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredSpec {
    /// Environment / profile name carried into plans and results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    // Identity and access
    pub users: Vec<UserSpec>,
    pub groups: Vec<GroupSpec>,
    pub roles: Vec<RoleSpec>,
    pub acls: Vec<AclSpec>,
    pub tokens: Vec<TokenSpec>,
    pub pools: Vec<PoolSpec>,

    // Networking
    pub networks: Vec<NetworkSpec>,
    pub sdn_zones: Vec<SdnZoneSpec>,
    pub sdn_vnets: Vec<SdnVnetSpec>,
    pub sdn_subnets: Vec<SdnSubnetSpec>,

    // Storage
    pub storages: Vec<StorageSpec>,
    pub storage_pools: Vec<StoragePoolSpec>,

    // Guests
    pub vms: Vec<VmSpec>,
    pub containers: Vec<CtSpec>,
    pub deletes: Vec<DeleteSpec>,
    pub snapshots: Vec<SnapshotSpec>,
    pub migrations: Vec<MigrationSpec>,
    pub disk_moves: Vec<DiskMoveSpec>,
    pub volume_copies: Vec<VolumeCopySpec>,
    pub backups: Vec<BackupSpec>,
    pub restores: Vec<RestoreSpec>,

    // Cluster services
    pub backup_jobs: Vec<BackupJobSpec>,
    pub replication_jobs: Vec<ReplicationJobSpec>,
    pub ha_groups: Vec<HaGroupSpec>,
    pub ha_resources: Vec<HaResourceSpec>,
    pub firewall_rules: Vec<FirewallRuleSpec>,
    pub firewall_aliases: Vec<FirewallAliasSpec>,
    pub node_actions: Vec<NodeActionSpec>,

    // Application layer
    pub stacks: Vec<StackSpec>,
    pub folders: Vec<FolderSpec>,
    pub datasources: Vec<DatasourceSpec>,
    pub dashboards: Vec<DashboardSpec>,

    // Ad hoc escape hatch
    pub hypervisor_crud: Vec<CrudSpec>,
    pub container_crud: Vec<CrudSpec>,
    pub observability_crud: Vec<CrudSpec>,
}

impl DesiredSpec {
    /// Environment name, `default` when unset
    pub fn env_name(&self) -> &str {
        self.env.as_deref().unwrap_or("default")
    }
}
