//! Data model shared by the planner, preflight and executor
//!
//! - [`DesiredSpec`]: what the operator declared
//! - [`CurrentState`]: what the scanner observed
//! - [`Plan`] / [`PlanAction`]: the ordered changes between the two
//! - [`ApplyResult`]: what happened when a plan was executed

pub mod access;
pub mod action;
pub mod apps;
pub mod cluster;
pub mod compute;
pub mod desired;
pub mod result;
pub mod state;

use serde::{Deserialize, Serialize};

pub use access::{AclSpec, GroupSpec, PoolSpec, RoleSpec, TokenSpec, UserSpec};
pub use action::{ActionKind, ActionOp, Backend, ConfigChange, Plan, PlanAction};
pub use apps::{CrudSpec, DashboardSpec, DatasourceSpec, FolderSpec, StackSpec};
pub use cluster::{
    BackupJobSpec, FirewallAliasSpec, FirewallRuleSpec, FirewallScope, HaGroupSpec,
    HaResourceSpec, NetworkSpec, NodeAction, NodeActionSpec, ReplicationJobSpec, SdnSubnetSpec,
    SdnVnetSpec, SdnZoneSpec, StoragePoolSpec, StoragePoolType, StorageSpec,
};
pub use compute::{
    BackupMode, BackupSpec, CloneSpec, CtSpec, DeleteSpec, DiskMoveSpec, DiskSpec, GuestKind,
    MigrationSpec, PowerState, RestoreSpec, SnapshotSpec, VmSpec, VolumeCopySpec,
};
pub use desired::DesiredSpec;
pub use result::{ActionResult, ApplyResult, RollbackReport};
pub use state::{
    BackupArchive, CurrentState, DiskState, InstanceState, NodeState, StorageUsage, VolumeState,
};

/// Whether a declared entity should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl Ensure {
    pub fn is_present(self) -> bool {
        self == Self::Present
    }

    pub fn is_absent(self) -> bool {
        self == Self::Absent
    }
}

/// An entity declared in one of the desired-spec domains
///
/// The key identifies the entity within its domain: two desired entries with
/// the same key are a validation error, and current/desired entries with the
/// same key describe the same remote object.
pub trait Declared {
    /// Logical key, unique within the domain
    fn key(&self) -> String;

    /// Declared presence (defaults to present)
    fn ensure(&self) -> Ensure {
        Ensure::Present
    }
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}
