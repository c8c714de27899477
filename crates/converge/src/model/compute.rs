//! Guest entities: VMs, containers, their disks and one-shot guest operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Declared, Ensure, is_false};

/// Guest flavour; VMs and containers share the vmid namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestKind {
    #[default]
    Vm,
    Ct,
}

impl GuestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vm => "vm",
            Self::Ct => "ct",
        }
    }
}

/// Declared power state of a guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Running,
    Stopped,
}

/// A guest disk or mount point, keyed by `interface + index` (e.g. `scsi0`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    /// `scsi`, `virtio`, `sata`, `ide` for VMs; `rootfs`, `mp` for containers
    pub interface: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    /// Size with optional K/M/G/T suffix
    pub size: String,
}

impl DiskSpec {
    pub fn key(&self) -> String {
        disk_key(&self.interface, self.index)
    }
}

/// `rootfs` has no index; every other interface is `interface + index`
pub fn disk_key(interface: &str, index: u32) -> String {
    if interface == "rootfs" {
        interface.to_string()
    } else {
        format!("{interface}{index}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSpec {
    /// Template or guest to clone from
    pub source: u32,
    #[serde(default = "default_true")]
    pub full: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_storage: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSpec {
    pub vmid: u32,
    pub node: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sockets: Option<u32>,
    /// Memory in MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Bridges of the guest NICs, in NIC order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridges: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<DiskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerState>,
    /// Take a safety snapshot before stopping
    #[serde(default, skip_serializing_if = "is_false")]
    pub risky: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone: Option<CloneSpec>,
}

impl Declared for VmSpec {
    fn key(&self) -> String {
        self.vmid.to_string()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtSpec {
    pub vmid: u32,
    pub node: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Template volume used at creation, e.g. `local:vztmpl/debian-12.tar.zst`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ostemplate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridges: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unprivileged: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<DiskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerState>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub risky: bool,
}

impl Declared for CtSpec {
    fn key(&self) -> String {
        self.vmid.to_string()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

/// Explicit guest deletion, independent of the provisioning domains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSpec {
    pub vmid: u32,
    #[serde(default)]
    pub guest: GuestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Also remove the guest from jobs, HA and ACLs
    #[serde(default, skip_serializing_if = "is_false")]
    pub purge: bool,
}

impl Declared for DeleteSpec {
    fn key(&self) -> String {
        self.vmid.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSpec {
    #[serde(default)]
    pub guest: GuestKind,
    pub node: String,
    pub vmid: u32,
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_ram: bool,
}

impl Declared for SnapshotSpec {
    fn key(&self) -> String {
        format!("{}:{}@{}", self.guest.as_str(), self.vmid, self.name)
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

/// Keep a guest on the given node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSpec {
    pub vmid: u32,
    #[serde(default)]
    pub guest: GuestKind,
    pub target: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub online: bool,
}

impl Declared for MigrationSpec {
    fn key(&self) -> String {
        self.vmid.to_string()
    }
}

/// Keep a VM disk on the given storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskMoveSpec {
    pub vmid: u32,
    pub node: String,
    /// Disk key, e.g. `scsi0`
    pub disk: String,
    pub target_storage: String,
    #[serde(default = "default_true")]
    pub delete_source: bool,
}

impl Declared for DiskMoveSpec {
    fn key(&self) -> String {
        format!("{}/{}", self.vmid, self.disk)
    }
}

/// Keep a copy of a volume on another storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeCopySpec {
    pub node: String,
    /// Volume name without storage prefix, e.g. `iso/debian-12.iso`
    pub volume: String,
    pub source_storage: String,
    pub target_storage: String,
}

impl Declared for VolumeCopySpec {
    fn key(&self) -> String {
        format!("{}/{}->{}", self.node, self.volume, self.target_storage)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    #[default]
    Snapshot,
    Suspend,
    Stop,
}

/// Keep a recent backup of a guest on a storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSpec {
    pub vmid: u32,
    #[serde(default)]
    pub guest: GuestKind,
    pub node: String,
    pub storage: String,
    #[serde(default)]
    pub mode: BackupMode,
    /// A backup newer than this satisfies the entry
    #[serde(default = "default_backup_age")]
    pub max_age_hours: i64,
}

fn default_backup_age() -> i64 {
    24
}

impl Declared for BackupSpec {
    fn key(&self) -> String {
        format!("{}@{}", self.vmid, self.storage)
    }
}

impl BackupSpec {
    /// Whether an archive taken at `created_at` is fresh enough at `now`
    pub fn is_satisfied_by(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(created_at) < chrono::Duration::hours(self.max_age_hours)
    }
}

/// Restore a guest from a backup archive
///
/// Runs when the guest does not exist. With `force` it overwrites an existing
/// guest on every plan, which is high-risk and needs the confirmation sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSpec {
    pub vmid: u32,
    #[serde(default)]
    pub guest: GuestKind,
    pub node: String,
    pub archive: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<String>,
}

impl Declared for RestoreSpec {
    fn key(&self) -> String {
        self.vmid.to_string()
    }
}
