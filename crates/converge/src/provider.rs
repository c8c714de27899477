//! Provider traits for the three backends
//!
//! A provider is the remote API client for one backend. The executor calls
//! exactly one typed method per plan action; long-running operations answer
//! with a [`TaskHandle`] that the executor polls through
//! [`HypervisorProvider::task_status`].
//!
//! Every typed method has a default body forwarding to `call` with the
//! action kind and its fields as JSON (the same shape the action serializes
//! to, minus `kind` and `reason`). A client can implement the methods it cares
//! about and leave the rest to `call`, which reports the kind as unsupported.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::model::{
    AclSpec, ActionKind, BackupJobSpec, BackupMode, ConfigChange, CtSpec, DashboardSpec,
    DatasourceSpec, DiskSpec, FirewallAliasSpec, FirewallRuleSpec, FolderSpec, GroupSpec,
    GuestKind, HaGroupSpec, HaResourceSpec, NetworkSpec, PoolSpec, ReplicationJobSpec, RoleSpec,
    SdnSubnetSpec, SdnVnetSpec, SdnZoneSpec, StackSpec, StoragePoolSpec, StoragePoolType,
    StorageSpec, TokenSpec, UserSpec, VmSpec,
};
use crate::policy::{CrudRequest, PolicyViolation};

/// Failure of one provider call or remote task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The client has no implementation for this kind
    #[error("{kind} is not supported by this provider")]
    Unsupported { kind: ActionKind },

    /// The remote API answered with an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (connection, TLS, decoding)
    #[error("request failed: {0}")]
    Request(String),

    /// A remote task finished with a non-success exit status
    #[error("task {upid} on {node} failed: {exit_status}")]
    TaskFailed {
        node: String,
        upid: String,
        exit_status: String,
    },

    /// A remote task did not finish within the executor timeout
    #[error("task {upid} on {node} timed out after {secs}s")]
    TaskTimeout { node: String, upid: String, secs: u64 },

    /// An ad hoc call was rejected at dispatch time
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Opaque token for a remote operation whose completion must be polled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub node: String,
    pub upid: String,
}

/// One observation of a remote task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// `running` while in progress, anything else once finished
    pub status: String,
    /// Set once finished; `OK` is success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<String>,
}

impl TaskStatus {
    pub fn running() -> Self {
        Self {
            status: "running".to_string(),
            exit_status: None,
        }
    }

    pub fn stopped(exit_status: impl Into<String>) -> Self {
        Self {
            status: "stopped".to_string(),
            exit_status: Some(exit_status.into()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn is_success(&self) -> bool {
        self.exit_status.as_deref() == Some("OK")
    }
}

/// What a typed provider method produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Finished synchronously, with an optional JSON result
    Done(Option<Value>),
    /// Started a remote task to be polled
    Task(TaskHandle),
}

impl Outcome {
    pub fn empty() -> Self {
        Self::Done(None)
    }

    pub fn value(value: Value) -> Self {
        Self::Done(Some(value))
    }
}

fn unsupported(kind: ActionKind) -> ProviderResult<Outcome> {
    Err(ProviderError::Unsupported { kind })
}

/// Client for the hypervisor cluster API
pub trait HypervisorProvider {
    /// Fallback for typed operations without a dedicated implementation
    fn call(&mut self, kind: ActionKind, _args: Value) -> ProviderResult<Outcome> {
        unsupported(kind)
    }

    /// Sanitized ad hoc call
    fn request(&mut self, request: &CrudRequest) -> ProviderResult<Value>;

    /// Current status of a task started by a typed method
    fn task_status(&mut self, task: &TaskHandle) -> ProviderResult<TaskStatus>;

    // Identity and access

    fn create_user(&mut self, user: &UserSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateUser, json!({ "user": user }))
    }

    fn update_user(&mut self, user: &UserSpec, changes: &[ConfigChange]) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdateUser, json!({ "user": user, "changes": changes }))
    }

    fn delete_user(&mut self, userid: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteUser, json!({ "userid": userid }))
    }

    fn create_group(&mut self, group: &GroupSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateGroup, json!({ "group": group }))
    }

    fn update_group(
        &mut self,
        group: &GroupSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdateGroup, json!({ "group": group, "changes": changes }))
    }

    fn delete_group(&mut self, groupid: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteGroup, json!({ "groupid": groupid }))
    }

    fn create_role(&mut self, role: &RoleSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateRole, json!({ "role": role }))
    }

    fn update_role(&mut self, role: &RoleSpec, changes: &[ConfigChange]) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdateRole, json!({ "role": role, "changes": changes }))
    }

    fn delete_role(&mut self, roleid: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteRole, json!({ "roleid": roleid }))
    }

    fn grant_acl(&mut self, acl: &AclSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::GrantAcl, json!({ "acl": acl }))
    }

    fn revoke_acl(&mut self, acl: &AclSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::RevokeAcl, json!({ "acl": acl }))
    }

    fn create_token(&mut self, token: &TokenSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateToken, json!({ "token": token }))
    }

    fn update_token(
        &mut self,
        token: &TokenSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdateToken, json!({ "token": token, "changes": changes }))
    }

    fn delete_token(&mut self, userid: &str, tokenid: &str) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteToken,
            json!({ "userid": userid, "tokenid": tokenid }),
        )
    }

    fn create_pool(&mut self, pool: &PoolSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreatePool, json!({ "pool": pool }))
    }

    fn update_pool(&mut self, pool: &PoolSpec, changes: &[ConfigChange]) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdatePool, json!({ "pool": pool, "changes": changes }))
    }

    fn delete_pool(&mut self, poolid: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeletePool, json!({ "poolid": poolid }))
    }

    // Networking

    fn create_network(&mut self, network: &NetworkSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateNetwork, json!({ "network": network }))
    }

    fn update_network(
        &mut self,
        network: &NetworkSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateNetwork,
            json!({ "network": network, "changes": changes }),
        )
    }

    fn delete_network(&mut self, node: &str, iface: &str) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteNetwork,
            json!({ "node": node, "iface": iface }),
        )
    }

    fn reload_network(&mut self, node: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::ReloadNetwork, json!({ "node": node }))
    }

    fn create_sdn_zone(&mut self, zone: &SdnZoneSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateSdnZone, json!({ "zone": zone }))
    }

    fn update_sdn_zone(
        &mut self,
        zone: &SdnZoneSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdateSdnZone, json!({ "zone": zone, "changes": changes }))
    }

    fn delete_sdn_zone(&mut self, zone: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteSdnZone, json!({ "zone": zone }))
    }

    fn create_sdn_vnet(&mut self, vnet: &SdnVnetSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateSdnVnet, json!({ "vnet": vnet }))
    }

    fn update_sdn_vnet(
        &mut self,
        vnet: &SdnVnetSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdateSdnVnet, json!({ "vnet": vnet, "changes": changes }))
    }

    fn delete_sdn_vnet(&mut self, vnet: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteSdnVnet, json!({ "vnet": vnet }))
    }

    fn create_sdn_subnet(&mut self, subnet: &SdnSubnetSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateSdnSubnet, json!({ "subnet": subnet }))
    }

    fn update_sdn_subnet(
        &mut self,
        subnet: &SdnSubnetSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateSdnSubnet,
            json!({ "subnet": subnet, "changes": changes }),
        )
    }

    fn delete_sdn_subnet(&mut self, vnet: &str, subnet: &str) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteSdnSubnet,
            json!({ "vnet": vnet, "subnet": subnet }),
        )
    }

    fn apply_sdn(&mut self) -> ProviderResult<Outcome> {
        self.call(ActionKind::ApplySdn, json!({}))
    }

    // Storage

    fn create_storage(&mut self, storage: &StorageSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateStorage, json!({ "storage": storage }))
    }

    fn update_storage(
        &mut self,
        storage: &StorageSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateStorage,
            json!({ "storage": storage, "changes": changes }),
        )
    }

    fn delete_storage(&mut self, storage: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteStorage, json!({ "storage": storage }))
    }

    fn create_storage_pool(&mut self, pool: &StoragePoolSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateStoragePool, json!({ "pool": pool }))
    }

    fn delete_storage_pool(
        &mut self,
        node: &str,
        name: &str,
        pool_type: StoragePoolType,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteStoragePool,
            json!({ "node": node, "name": name, "pool_type": pool_type }),
        )
    }

    // Virtual machines

    fn create_vm(&mut self, vm: &VmSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateVm, json!({ "vm": vm }))
    }

    fn clone_vm(
        &mut self,
        node: &str,
        source: u32,
        vmid: u32,
        name: Option<&str>,
        target_storage: Option<&str>,
        full: bool,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::CloneVm,
            json!({
                "node": node,
                "source": source,
                "vmid": vmid,
                "name": name,
                "target_storage": target_storage,
                "full": full,
            }),
        )
    }

    fn update_vm_config(
        &mut self,
        node: &str,
        vmid: u32,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateVmConfig,
            json!({ "node": node, "vmid": vmid, "changes": changes }),
        )
    }

    fn reboot_vm(&mut self, node: &str, vmid: u32) -> ProviderResult<Outcome> {
        self.call(ActionKind::RebootVm, json!({ "node": node, "vmid": vmid }))
    }

    fn attach_disk(&mut self, node: &str, vmid: u32, disk: &DiskSpec) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::AttachDisk,
            json!({ "node": node, "vmid": vmid, "disk": disk }),
        )
    }

    fn detach_disk(&mut self, node: &str, vmid: u32, disk: &str) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DetachDisk,
            json!({ "node": node, "vmid": vmid, "disk": disk }),
        )
    }

    fn resize_disk(
        &mut self,
        node: &str,
        vmid: u32,
        disk: &str,
        size: &str,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::ResizeDisk,
            json!({ "node": node, "vmid": vmid, "disk": disk, "size": size }),
        )
    }

    fn move_disk(
        &mut self,
        node: &str,
        vmid: u32,
        disk: &str,
        target_storage: &str,
        delete_source: bool,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::MoveDisk,
            json!({
                "node": node,
                "vmid": vmid,
                "disk": disk,
                "target_storage": target_storage,
                "delete_source": delete_source,
            }),
        )
    }

    fn copy_volume(
        &mut self,
        node: &str,
        volume: &str,
        source_storage: &str,
        target_storage: &str,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::CopyVolume,
            json!({
                "node": node,
                "volume": volume,
                "source_storage": source_storage,
                "target_storage": target_storage,
            }),
        )
    }

    fn start_vm(&mut self, node: &str, vmid: u32) -> ProviderResult<Outcome> {
        self.call(ActionKind::StartVm, json!({ "node": node, "vmid": vmid }))
    }

    fn stop_vm(&mut self, node: &str, vmid: u32) -> ProviderResult<Outcome> {
        self.call(ActionKind::StopVm, json!({ "node": node, "vmid": vmid }))
    }

    fn resume_vm(&mut self, node: &str, vmid: u32) -> ProviderResult<Outcome> {
        self.call(ActionKind::ResumeVm, json!({ "node": node, "vmid": vmid }))
    }

    fn delete_vm(&mut self, node: &str, vmid: u32, purge: bool) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteVm,
            json!({ "node": node, "vmid": vmid, "purge": purge }),
        )
    }

    // Containers

    fn create_ct(&mut self, ct: &CtSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateCt, json!({ "ct": ct }))
    }

    fn update_ct_config(
        &mut self,
        node: &str,
        vmid: u32,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateCtConfig,
            json!({ "node": node, "vmid": vmid, "changes": changes }),
        )
    }

    fn reboot_ct(&mut self, node: &str, vmid: u32) -> ProviderResult<Outcome> {
        self.call(ActionKind::RebootCt, json!({ "node": node, "vmid": vmid }))
    }

    fn resize_ct_disk(
        &mut self,
        node: &str,
        vmid: u32,
        disk: &str,
        size: &str,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::ResizeCtDisk,
            json!({ "node": node, "vmid": vmid, "disk": disk, "size": size }),
        )
    }

    fn start_ct(&mut self, node: &str, vmid: u32) -> ProviderResult<Outcome> {
        self.call(ActionKind::StartCt, json!({ "node": node, "vmid": vmid }))
    }

    fn stop_ct(&mut self, node: &str, vmid: u32) -> ProviderResult<Outcome> {
        self.call(ActionKind::StopCt, json!({ "node": node, "vmid": vmid }))
    }

    fn delete_ct(&mut self, node: &str, vmid: u32, purge: bool) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteCt,
            json!({ "node": node, "vmid": vmid, "purge": purge }),
        )
    }

    // Guest operations

    fn create_snapshot(
        &mut self,
        guest: GuestKind,
        node: &str,
        vmid: u32,
        name: &str,
        description: Option<&str>,
        include_ram: bool,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::CreateSnapshot,
            json!({
                "guest": guest,
                "node": node,
                "vmid": vmid,
                "name": name,
                "description": description,
                "include_ram": include_ram,
            }),
        )
    }

    fn delete_snapshot(
        &mut self,
        guest: GuestKind,
        node: &str,
        vmid: u32,
        name: &str,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteSnapshot,
            json!({ "guest": guest, "node": node, "vmid": vmid, "name": name }),
        )
    }

    fn migrate_guest(
        &mut self,
        guest: GuestKind,
        node: &str,
        vmid: u32,
        target: &str,
        online: bool,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::MigrateGuest,
            json!({
                "guest": guest,
                "node": node,
                "vmid": vmid,
                "target": target,
                "online": online,
            }),
        )
    }

    fn backup_guest(
        &mut self,
        guest: GuestKind,
        node: &str,
        vmid: u32,
        storage: &str,
        mode: BackupMode,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::BackupGuest,
            json!({
                "guest": guest,
                "node": node,
                "vmid": vmid,
                "storage": storage,
                "mode": mode,
            }),
        )
    }

    fn restore_guest(
        &mut self,
        guest: GuestKind,
        node: &str,
        vmid: u32,
        archive: &str,
        storage: Option<&str>,
        force: bool,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::RestoreGuest,
            json!({
                "guest": guest,
                "node": node,
                "vmid": vmid,
                "archive": archive,
                "storage": storage,
                "force": force,
            }),
        )
    }

    // Cluster services

    fn create_backup_job(&mut self, job: &BackupJobSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateBackupJob, json!({ "job": job }))
    }

    fn update_backup_job(
        &mut self,
        job: &BackupJobSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdateBackupJob, json!({ "job": job, "changes": changes }))
    }

    fn delete_backup_job(&mut self, id: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteBackupJob, json!({ "id": id }))
    }

    fn create_replication_job(&mut self, job: &ReplicationJobSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateReplicationJob, json!({ "job": job }))
    }

    fn update_replication_job(
        &mut self,
        job: &ReplicationJobSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateReplicationJob,
            json!({ "job": job, "changes": changes }),
        )
    }

    fn delete_replication_job(&mut self, id: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteReplicationJob, json!({ "id": id }))
    }

    fn create_ha_group(&mut self, group: &HaGroupSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateHaGroup, json!({ "group": group }))
    }

    fn update_ha_group(
        &mut self,
        group: &HaGroupSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(ActionKind::UpdateHaGroup, json!({ "group": group, "changes": changes }))
    }

    fn delete_ha_group(&mut self, group: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteHaGroup, json!({ "group": group }))
    }

    fn create_ha_resource(&mut self, resource: &HaResourceSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateHaResource, json!({ "resource": resource }))
    }

    fn update_ha_resource(
        &mut self,
        resource: &HaResourceSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateHaResource,
            json!({ "resource": resource, "changes": changes }),
        )
    }

    fn delete_ha_resource(&mut self, sid: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteHaResource, json!({ "sid": sid }))
    }

    // Firewall

    fn create_firewall_rule(&mut self, rule: &FirewallRuleSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateFirewallRule, json!({ "rule": rule }))
    }

    fn update_firewall_rule(
        &mut self,
        rule: &FirewallRuleSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateFirewallRule,
            json!({ "rule": rule, "changes": changes }),
        )
    }

    fn delete_firewall_rule(&mut self, rule: &FirewallRuleSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteFirewallRule, json!({ "rule": rule }))
    }

    fn create_firewall_alias(&mut self, alias: &FirewallAliasSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateFirewallAlias, json!({ "alias": alias }))
    }

    fn update_firewall_alias(
        &mut self,
        alias: &FirewallAliasSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateFirewallAlias,
            json!({ "alias": alias, "changes": changes }),
        )
    }

    fn delete_firewall_alias(&mut self, name: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteFirewallAlias, json!({ "name": name }))
    }

    // Nodes

    fn reboot_node(&mut self, node: &str, payload: Option<&Value>) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::RebootNode,
            json!({ "node": node, "payload": payload }),
        )
    }

    fn shutdown_node(&mut self, node: &str, payload: Option<&Value>) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::ShutdownNode,
            json!({ "node": node, "payload": payload }),
        )
    }
}

/// Client for the container runtime (compose stacks)
pub trait ContainerProvider {
    fn call(&mut self, kind: ActionKind, _args: Value) -> ProviderResult<Outcome> {
        unsupported(kind)
    }

    fn request(&mut self, request: &CrudRequest) -> ProviderResult<Value>;

    /// Create a stack; the result should carry the server-assigned `id`
    fn create_stack(&mut self, stack: &StackSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateStack, json!({ "stack": stack }))
    }

    fn update_stack(
        &mut self,
        id: u64,
        stack: &StackSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateStack,
            json!({ "id": id, "stack": stack, "changes": changes }),
        )
    }

    fn redeploy_stack(
        &mut self,
        id: u64,
        endpoint_id: u64,
        name: &str,
        revision: Option<&str>,
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::RedeployStack,
            json!({ "id": id, "endpoint_id": endpoint_id, "name": name, "revision": revision }),
        )
    }

    fn delete_stack(&mut self, id: u64, endpoint_id: u64, name: &str) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteStack,
            json!({ "id": id, "endpoint_id": endpoint_id, "name": name }),
        )
    }
}

/// Client for the observability platform
pub trait ObservabilityProvider {
    fn call(&mut self, kind: ActionKind, _args: Value) -> ProviderResult<Outcome> {
        unsupported(kind)
    }

    fn request(&mut self, request: &CrudRequest) -> ProviderResult<Value>;

    /// Create a folder; the result should carry the server-assigned `uid`
    fn create_folder(&mut self, folder: &FolderSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateFolder, json!({ "folder": folder }))
    }

    fn update_folder(
        &mut self,
        uid: &str,
        folder: &FolderSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateFolder,
            json!({ "uid": uid, "folder": folder, "changes": changes }),
        )
    }

    fn delete_folder(&mut self, uid: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteFolder, json!({ "uid": uid }))
    }

    fn create_datasource(&mut self, datasource: &DatasourceSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateDatasource, json!({ "datasource": datasource }))
    }

    fn update_datasource(
        &mut self,
        uid: &str,
        datasource: &DatasourceSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateDatasource,
            json!({ "uid": uid, "datasource": datasource, "changes": changes }),
        )
    }

    fn delete_datasource(&mut self, uid: &str, name: &str) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::DeleteDatasource,
            json!({ "uid": uid, "name": name }),
        )
    }

    fn create_dashboard(&mut self, dashboard: &DashboardSpec) -> ProviderResult<Outcome> {
        self.call(ActionKind::CreateDashboard, json!({ "dashboard": dashboard }))
    }

    fn update_dashboard(
        &mut self,
        uid: &str,
        dashboard: &DashboardSpec,
        changes: &[ConfigChange],
    ) -> ProviderResult<Outcome> {
        self.call(
            ActionKind::UpdateDashboard,
            json!({ "uid": uid, "dashboard": dashboard, "changes": changes }),
        )
    }

    fn delete_dashboard(&mut self, uid: &str) -> ProviderResult<Outcome> {
        self.call(ActionKind::DeleteDashboard, json!({ "uid": uid }))
    }
}

/// The provider clients available to one executor run
///
/// Built once per run and handed to the executor; a backend left `None`
/// makes any plan that needs it fail before the first call.
#[derive(Default)]
pub struct Providers<'a> {
    pub hypervisor: Option<&'a mut dyn HypervisorProvider>,
    pub containers: Option<&'a mut dyn ContainerProvider>,
    pub observability: Option<&'a mut dyn ObservabilityProvider>,
}

impl<'a> Providers<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hypervisor(mut self, provider: &'a mut dyn HypervisorProvider) -> Self {
        self.hypervisor = Some(provider);
        self
    }

    pub fn with_containers(mut self, provider: &'a mut dyn ContainerProvider) -> Self {
        self.containers = Some(provider);
        self
    }

    pub fn with_observability(mut self, provider: &'a mut dyn ObservabilityProvider) -> Self {
        self.observability = Some(provider);
        self
    }

    pub fn has(&self, backend: crate::model::Backend) -> bool {
        use crate::model::Backend;

        match backend {
            Backend::Hypervisor => self.hypervisor.is_some(),
            Backend::Containers => self.containers.is_some(),
            Backend::Observability => self.observability.is_some(),
        }
    }
}

/// Memo of per-node capability probes, kept for the life of one client
///
/// Clients probe optional endpoints (SDN, ZFS pools, firewall) once per node
/// and skip the calls a node does not offer. A failed probe is not cached.
#[derive(Debug, Default)]
pub struct NodeCapabilities {
    probed: HashMap<(String, String), bool>,
}

impl NodeCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached answer for `capability` on `node`, probing on first use
    pub fn supports<F>(&mut self, node: &str, capability: &str, probe: F) -> ProviderResult<bool>
    where
        F: FnOnce() -> ProviderResult<bool>,
    {
        let key = (node.to_string(), capability.to_string());
        if let Some(&known) = self.probed.get(&key) {
            return Ok(known);
        }

        let supported = probe()?;
        log::debug!("Node {node} supports {capability}: {supported}");
        self.probed.insert(key, supported);
        Ok(supported)
    }

    pub fn forget(&mut self, node: &str) {
        self.probed.retain(|(n, _), _| n != node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_probe_once_per_node() {
        let mut caps = NodeCapabilities::new();
        let mut probes = 0;

        for _ in 0..3 {
            let supported = caps
                .supports("pve1", "sdn", || {
                    probes += 1;
                    Ok(true)
                })
                .unwrap();
            assert!(supported);
        }
        assert_eq!(probes, 1);

        assert!(!caps.supports("pve2", "sdn", || Ok(false)).unwrap());

        let err = caps
            .supports("pve3", "sdn", || {
                Err(ProviderError::Request("connection refused".into()))
            })
            .unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
        assert!(caps.supports("pve3", "sdn", || Ok(true)).unwrap());

        caps.forget("pve1");
        assert!(!caps.supports("pve1", "sdn", || Ok(false)).unwrap());
    }

    struct Recorder {
        calls: Vec<(ActionKind, Value)>,
    }

    impl HypervisorProvider for Recorder {
        fn call(&mut self, kind: ActionKind, args: Value) -> ProviderResult<Outcome> {
            self.calls.push((kind, args));
            Ok(Outcome::empty())
        }

        fn request(&mut self, _request: &CrudRequest) -> ProviderResult<Value> {
            Ok(Value::Null)
        }

        fn task_status(&mut self, _task: &TaskHandle) -> ProviderResult<TaskStatus> {
            Ok(TaskStatus::stopped("OK"))
        }
    }

    #[test]
    fn test_default_methods_forward_to_call() {
        let mut recorder = Recorder { calls: Vec::new() };
        recorder.start_vm("pve1", 101).unwrap();
        recorder.delete_network("pve1", "vmbr1").unwrap();

        assert_eq!(recorder.calls.len(), 2);
        assert_eq!(recorder.calls[0].0, ActionKind::StartVm);
        assert_eq!(recorder.calls[0].1, json!({"node": "pve1", "vmid": 101}));
        assert_eq!(recorder.calls[1].1["iface"], "vmbr1");
    }

    #[test]
    fn test_call_defaults_to_unsupported() {
        struct Bare;
        impl ContainerProvider for Bare {
            fn request(&mut self, _request: &CrudRequest) -> ProviderResult<Value> {
                Ok(Value::Null)
            }
        }

        let err = Bare.delete_stack(1, 2, "web").unwrap_err();
        assert_eq!(
            err,
            ProviderError::Unsupported {
                kind: ActionKind::DeleteStack
            }
        );
        assert_eq!(err.to_string(), "delete_stack is not supported by this provider");
    }

    #[test]
    fn test_task_status_classification() {
        assert!(TaskStatus::running().is_running());
        assert!(TaskStatus::stopped("OK").is_success());
        let failed = TaskStatus::stopped("command 'zpool create' failed");
        assert!(!failed.is_running());
        assert!(!failed.is_success());
    }
}
