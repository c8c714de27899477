//! Cluster infrastructure entities: networking, SDN, storage, jobs, HA, firewall, nodes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Declared, Ensure, is_false};

// ============================================================================
// Networking
// ============================================================================

/// A node network interface (bridge, bond, vlan)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub node: String,
    pub iface: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// `bridge`, `bond`, `vlan`, `eth`, ...
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub iface_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_ports: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_vlan_aware: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autostart: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl Declared for NetworkSpec {
    fn key(&self) -> String {
        format!("{}/{}", self.node, self.iface)
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdnZoneSpec {
    pub zone: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// `simple`, `vlan`, `vxlan`, `evpn`, `qinq`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub zone_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
}

impl Declared for SdnZoneSpec {
    fn key(&self) -> String {
        self.zone.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdnVnetSpec {
    pub vnet: String,
    pub zone: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Declared for SdnVnetSpec {
    fn key(&self) -> String {
        self.vnet.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdnSubnetSpec {
    pub vnet: String,
    /// Subnet CIDR, e.g. `10.20.0.0/24`
    pub subnet: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snat: Option<bool>,
}

impl Declared for SdnSubnetSpec {
    fn key(&self) -> String {
        format!("{}/{}", self.vnet, self.subnet)
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

// ============================================================================
// Storage
// ============================================================================

/// A cluster storage definition (`dir`, `nfs`, `lvmthin`, `zfspool`, `pbs`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSpec {
    pub storage: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
}

impl Declared for StorageSpec {
    fn key(&self) -> String {
        self.storage.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoragePoolType {
    Zfs,
    Lvm,
    Lvmthin,
    Directory,
}

/// A node-local pool or filesystem built from raw devices
///
/// Creation initializes the listed devices, so it is high-risk and must carry
/// the confirmation sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePoolSpec {
    pub node: String,
    pub name: String,
    #[serde(rename = "type")]
    pub pool_type: StoragePoolType,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub devices: Vec<String>,
    /// ZFS raid level (`single`, `mirror`, `raidz`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raidlevel: Option<String>,
    /// Filesystem for directory pools (`ext4`, `xfs`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<String>,
    /// Also register the pool as cluster storage
    #[serde(default, skip_serializing_if = "is_false")]
    pub add_storage: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<String>,
}

impl Declared for StoragePoolSpec {
    fn key(&self) -> String {
        format!("{}/{}", self.node, self.name)
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

// ============================================================================
// Backup, replication, HA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJobSpec {
    pub id: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmids: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Retention expression, e.g. `keep-daily=7,keep-weekly=4`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune_backups: Option<String>,
}

impl Declared for BackupJobSpec {
    fn key(&self) -> String {
        self.id.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationJobSpec {
    /// `<vmid>-<n>`
    pub id: String,
    pub target: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Rate limit in MB/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
}

impl Declared for ReplicationJobSpec {
    fn key(&self) -> String {
        self.id.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

impl ReplicationJobSpec {
    /// Guest id encoded in the job id
    pub fn vmid(&self) -> Option<u32> {
        self.id.split('-').next().and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaGroupSpec {
    pub group: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// `node[:priority]` entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nofailback: Option<bool>,
}

impl Declared for HaGroupSpec {
    fn key(&self) -> String {
        self.group.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaResourceSpec {
    /// `vm:<vmid>` or `ct:<vmid>`
    pub sid: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// `started`, `stopped`, `ignored`, `disabled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restart: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_relocate: Option<u32>,
}

impl Declared for HaResourceSpec {
    fn key(&self) -> String {
        self.sid.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

// ============================================================================
// Firewall
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallScope {
    Cluster,
    Node,
    Vm,
}

/// A firewall rule, identified by name within its scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRuleSpec {
    pub name: String,
    pub scope: FirewallScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmid: Option<u32>,
    #[serde(default)]
    pub ensure: Ensure,
    /// `in` or `out`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// `ACCEPT`, `DROP`, `REJECT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
}

impl Declared for FirewallRuleSpec {
    fn key(&self) -> String {
        let scope = match self.scope {
            FirewallScope::Cluster => "cluster".to_string(),
            FirewallScope::Node => format!("node:{}", self.node.as_deref().unwrap_or("?")),
            FirewallScope::Vm => format!("vm:{}", self.vmid.unwrap_or_default()),
        };
        format!("{scope}/{}", self.name)
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallAliasSpec {
    pub name: String,
    pub cidr: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Declared for FirewallAliasSpec {
    fn key(&self) -> String {
        self.name.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

// ============================================================================
// Node operations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAction {
    Reboot,
    Shutdown,
}

/// A one-shot, node-wide power operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeActionSpec {
    pub node: String,
    pub action: NodeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<String>,
    /// Extra parameters forwarded to the node endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Declared for NodeActionSpec {
    fn key(&self) -> String {
        let action = match self.action {
            NodeAction::Reboot => "reboot",
            NodeAction::Shutdown => "shutdown",
        };
        format!("{}/{action}", self.node)
    }
}
