//! Observed snapshot of managed infrastructure
//!
//! Produced by an external scanner and read-only to this crate. Config-object
//! domains reuse the desired-spec entity types so the two sides diff directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::access::{AclSpec, GroupSpec, PoolSpec, RoleSpec, TokenSpec, UserSpec};
use super::apps::{DashboardSpec, DatasourceSpec, FolderSpec, StackSpec};
use super::cluster::{
    BackupJobSpec, FirewallAliasSpec, FirewallRuleSpec, HaGroupSpec, HaResourceSpec, NetworkSpec,
    ReplicationJobSpec, SdnSubnetSpec, SdnVnetSpec, SdnZoneSpec, StoragePoolSpec, StorageSpec,
};
use super::compute::{GuestKind, SnapshotSpec, disk_key};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskState {
    pub interface: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    pub size: String,
}

impl DiskState {
    pub fn key(&self) -> String {
        disk_key(&self.interface, self.index)
    }
}

/// An observed VM or container
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceState {
    pub vmid: u32,
    pub node: String,
    /// `running`, `stopped`, `paused`, ...
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sockets: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    pub tags: Vec<String>,
    pub bridges: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unprivileged: Option<bool>,
    pub disks: Vec<DiskState>,
    pub template: bool,
}

impl InstanceState {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn disk(&self, key: &str) -> Option<&DiskState> {
        self.disks.iter().find(|d| d.key() == key)
    }
}

/// Utilization figures reported for one storage
///
/// Field names vary between scanner versions (`used`/`disk`, `total`/`maxdisk`,
/// `avail`/`available`), so the figures are kept as a raw map and read through
/// the planner's capacity policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub storage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StorageUsage {
    /// First numeric value among `names`
    pub fn number(&self, names: &[String]) -> Option<f64> {
        names.iter().find_map(|name| match self.fields.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

/// A volume present on a storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeState {
    pub node: String,
    pub storage: String,
    pub volume: String,
}

/// A backup archive present on a storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArchive {
    pub vmid: u32,
    pub storage: String,
    pub volid: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentState {
    pub nodes: Vec<NodeState>,
    pub vms: Vec<InstanceState>,
    pub containers: Vec<InstanceState>,
    pub snapshots: Vec<SnapshotSpec>,
    pub backups: Vec<BackupArchive>,
    pub volumes: Vec<VolumeState>,

    pub users: Vec<UserSpec>,
    pub groups: Vec<GroupSpec>,
    pub roles: Vec<RoleSpec>,
    pub acls: Vec<AclSpec>,
    pub tokens: Vec<TokenSpec>,
    pub pools: Vec<PoolSpec>,

    pub networks: Vec<NetworkSpec>,
    pub sdn_zones: Vec<SdnZoneSpec>,
    pub sdn_vnets: Vec<SdnVnetSpec>,
    pub sdn_subnets: Vec<SdnSubnetSpec>,

    pub storages: Vec<StorageSpec>,
    pub storage_pools: Vec<StoragePoolSpec>,
    pub storage_usage: Vec<StorageUsage>,

    pub backup_jobs: Vec<BackupJobSpec>,
    pub replication_jobs: Vec<ReplicationJobSpec>,
    pub ha_groups: Vec<HaGroupSpec>,
    pub ha_resources: Vec<HaResourceSpec>,
    pub firewall_rules: Vec<FirewallRuleSpec>,
    pub firewall_aliases: Vec<FirewallAliasSpec>,

    pub stacks: Vec<StackSpec>,
    pub folders: Vec<FolderSpec>,
    pub datasources: Vec<DatasourceSpec>,
    pub dashboards: Vec<DashboardSpec>,
}

impl CurrentState {
    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name)
    }

    pub fn vm(&self, vmid: u32) -> Option<&InstanceState> {
        self.vms.iter().find(|i| i.vmid == vmid)
    }

    pub fn container(&self, vmid: u32) -> Option<&InstanceState> {
        self.containers.iter().find(|i| i.vmid == vmid)
    }

    pub fn guest(&self, guest: GuestKind, vmid: u32) -> Option<&InstanceState> {
        match guest {
            GuestKind::Vm => self.vm(vmid),
            GuestKind::Ct => self.container(vmid),
        }
    }
}
