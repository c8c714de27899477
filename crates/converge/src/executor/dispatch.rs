//! Routing of plan actions to provider methods

use serde_json::Value;

use super::ExecuteOptions;
use super::tasks::wait_for_task;
use crate::context::{Clock, ProgressCallback};
use crate::model::{ActionKind, ActionOp, Backend, CrudSpec};
use crate::policy::{self, CrudRequest};
use crate::provider::{
    ContainerProvider, HypervisorProvider, ObservabilityProvider, Outcome, ProviderError,
    ProviderResult, Providers,
};
use crate::{Error, Result};

fn hypervisor<'p, 'a>(
    providers: &'p mut Providers<'a>,
    kind: ActionKind,
) -> Result<&'p mut (dyn HypervisorProvider + 'a)> {
    providers.hypervisor.as_deref_mut().ok_or(Error::MissingProvider {
        backend: Backend::Hypervisor,
        kind,
    })
}

fn containers<'p, 'a>(
    providers: &'p mut Providers<'a>,
    kind: ActionKind,
) -> Result<&'p mut (dyn ContainerProvider + 'a)> {
    providers.containers.as_deref_mut().ok_or(Error::MissingProvider {
        backend: Backend::Containers,
        kind,
    })
}

fn observability<'p, 'a>(
    providers: &'p mut Providers<'a>,
    kind: ActionKind,
) -> Result<&'p mut (dyn ObservabilityProvider + 'a)> {
    providers.observability.as_deref_mut().ok_or(Error::MissingProvider {
        backend: Backend::Observability,
        kind,
    })
}

/// First action whose backend has no provider
pub(super) fn missing_provider<'p>(
    actions: impl IntoIterator<Item = &'p ActionOp>,
    providers: &Providers<'_>,
) -> Option<Error> {
    actions
        .into_iter()
        .find(|op| !providers.has(op.backend()))
        .map(|op| Error::MissingProvider {
            backend: op.backend(),
            kind: op.kind(),
        })
}

/// The policy is evaluated again right before the call
fn sanitized(scope: Backend, spec: &CrudSpec) -> ProviderResult<CrudRequest> {
    Ok(policy::evaluate(scope, spec)?)
}

/// Run one operation and wait for any task it starts
///
/// The outer error is an engine fault; the inner one is the failure of this
/// action alone.
pub(super) fn dispatch<P: ProgressCallback, K: Clock>(
    op: &ActionOp,
    providers: &mut Providers<'_>,
    opts: &ExecuteOptions,
    progress: &mut P,
    clock: &mut K,
) -> Result<ProviderResult<Option<Value>>> {
    let kind = op.kind();

    let outcome = match call(op, kind, providers)? {
        Ok(outcome) => outcome,
        Err(e) => return Ok(Err(e)),
    };

    match outcome {
        Outcome::Done(value) => Ok(Ok(value)),
        Outcome::Task(handle) if op.backend() == Backend::Hypervisor => {
            let provider = hypervisor(providers, kind)?;
            Ok(wait_for_task(provider, &handle, kind, opts, progress, clock))
        }
        Outcome::Task(handle) => Ok(Err(ProviderError::Request(format!(
            "{kind} returned task {} but {} tasks cannot be polled",
            handle.upid,
            op.backend()
        )))),
    }
}

fn call(
    op: &ActionOp,
    kind: ActionKind,
    providers: &mut Providers<'_>,
) -> Result<ProviderResult<Outcome>> {
    let outcome = match op {
        // Identity and access
        ActionOp::CreateUser { user } => hypervisor(providers, kind)?.create_user(user),
        ActionOp::UpdateUser { user, changes } => {
            hypervisor(providers, kind)?.update_user(user, changes)
        }
        ActionOp::DeleteUser { userid } => hypervisor(providers, kind)?.delete_user(userid),
        ActionOp::CreateGroup { group } => hypervisor(providers, kind)?.create_group(group),
        ActionOp::UpdateGroup { group, changes } => {
            hypervisor(providers, kind)?.update_group(group, changes)
        }
        ActionOp::DeleteGroup { groupid } => hypervisor(providers, kind)?.delete_group(groupid),
        ActionOp::CreateRole { role } => hypervisor(providers, kind)?.create_role(role),
        ActionOp::UpdateRole { role, changes } => {
            hypervisor(providers, kind)?.update_role(role, changes)
        }
        ActionOp::DeleteRole { roleid } => hypervisor(providers, kind)?.delete_role(roleid),
        ActionOp::GrantAcl { acl } => hypervisor(providers, kind)?.grant_acl(acl),
        ActionOp::RevokeAcl { acl } => hypervisor(providers, kind)?.revoke_acl(acl),
        ActionOp::CreateToken { token } => hypervisor(providers, kind)?.create_token(token),
        ActionOp::UpdateToken { token, changes } => {
            hypervisor(providers, kind)?.update_token(token, changes)
        }
        ActionOp::DeleteToken { userid, tokenid } => {
            hypervisor(providers, kind)?.delete_token(userid, tokenid)
        }
        ActionOp::CreatePool { pool } => hypervisor(providers, kind)?.create_pool(pool),
        ActionOp::UpdatePool { pool, changes } => {
            hypervisor(providers, kind)?.update_pool(pool, changes)
        }
        ActionOp::DeletePool { poolid } => hypervisor(providers, kind)?.delete_pool(poolid),

        // Networking
        ActionOp::CreateNetwork { network } => hypervisor(providers, kind)?.create_network(network),
        ActionOp::UpdateNetwork { network, changes } => {
            hypervisor(providers, kind)?.update_network(network, changes)
        }
        ActionOp::DeleteNetwork { node, iface } => {
            hypervisor(providers, kind)?.delete_network(node, iface)
        }
        ActionOp::ReloadNetwork { node } => hypervisor(providers, kind)?.reload_network(node),
        ActionOp::CreateSdnZone { zone } => hypervisor(providers, kind)?.create_sdn_zone(zone),
        ActionOp::UpdateSdnZone { zone, changes } => {
            hypervisor(providers, kind)?.update_sdn_zone(zone, changes)
        }
        ActionOp::DeleteSdnZone { zone } => hypervisor(providers, kind)?.delete_sdn_zone(zone),
        ActionOp::CreateSdnVnet { vnet } => hypervisor(providers, kind)?.create_sdn_vnet(vnet),
        ActionOp::UpdateSdnVnet { vnet, changes } => {
            hypervisor(providers, kind)?.update_sdn_vnet(vnet, changes)
        }
        ActionOp::DeleteSdnVnet { vnet } => hypervisor(providers, kind)?.delete_sdn_vnet(vnet),
        ActionOp::CreateSdnSubnet { subnet } => {
            hypervisor(providers, kind)?.create_sdn_subnet(subnet)
        }
        ActionOp::UpdateSdnSubnet { subnet, changes } => {
            hypervisor(providers, kind)?.update_sdn_subnet(subnet, changes)
        }
        ActionOp::DeleteSdnSubnet { vnet, subnet } => {
            hypervisor(providers, kind)?.delete_sdn_subnet(vnet, subnet)
        }
        ActionOp::ApplySdn {} => hypervisor(providers, kind)?.apply_sdn(),

        // Storage
        ActionOp::CreateStorage { storage } => hypervisor(providers, kind)?.create_storage(storage),
        ActionOp::UpdateStorage { storage, changes } => {
            hypervisor(providers, kind)?.update_storage(storage, changes)
        }
        ActionOp::DeleteStorage { storage } => hypervisor(providers, kind)?.delete_storage(storage),
        ActionOp::CreateStoragePool { pool } => {
            hypervisor(providers, kind)?.create_storage_pool(pool)
        }
        ActionOp::DeleteStoragePool {
            node,
            name,
            pool_type,
        } => hypervisor(providers, kind)?.delete_storage_pool(node, name, *pool_type),

        // Virtual machines
        ActionOp::CreateVm { vm } => hypervisor(providers, kind)?.create_vm(vm),
        ActionOp::CloneVm {
            node,
            source,
            vmid,
            name,
            target_storage,
            full,
        } => hypervisor(providers, kind)?.clone_vm(
            node,
            *source,
            *vmid,
            name.as_deref(),
            target_storage.as_deref(),
            *full,
        ),
        ActionOp::UpdateVmConfig {
            node,
            vmid,
            changes,
        } => hypervisor(providers, kind)?.update_vm_config(node, *vmid, changes),
        ActionOp::RebootVm { node, vmid } => hypervisor(providers, kind)?.reboot_vm(node, *vmid),
        ActionOp::AttachDisk { node, vmid, disk } => {
            hypervisor(providers, kind)?.attach_disk(node, *vmid, disk)
        }
        ActionOp::DetachDisk { node, vmid, disk } => {
            hypervisor(providers, kind)?.detach_disk(node, *vmid, disk)
        }
        ActionOp::ResizeDisk {
            node,
            vmid,
            disk,
            size,
        } => hypervisor(providers, kind)?.resize_disk(node, *vmid, disk, size),
        ActionOp::MoveDisk {
            node,
            vmid,
            disk,
            target_storage,
            delete_source,
        } => hypervisor(providers, kind)?.move_disk(
            node,
            *vmid,
            disk,
            target_storage,
            *delete_source,
        ),
        ActionOp::CopyVolume {
            node,
            volume,
            source_storage,
            target_storage,
        } => hypervisor(providers, kind)?.copy_volume(node, volume, source_storage, target_storage),
        ActionOp::StartVm { node, vmid } => hypervisor(providers, kind)?.start_vm(node, *vmid),
        ActionOp::StopVm { node, vmid } => hypervisor(providers, kind)?.stop_vm(node, *vmid),
        ActionOp::ResumeVm { node, vmid } => hypervisor(providers, kind)?.resume_vm(node, *vmid),
        ActionOp::DeleteVm { node, vmid, purge } => {
            hypervisor(providers, kind)?.delete_vm(node, *vmid, *purge)
        }

        // Containers
        ActionOp::CreateCt { ct } => hypervisor(providers, kind)?.create_ct(ct),
        ActionOp::UpdateCtConfig {
            node,
            vmid,
            changes,
        } => hypervisor(providers, kind)?.update_ct_config(node, *vmid, changes),
        ActionOp::RebootCt { node, vmid } => hypervisor(providers, kind)?.reboot_ct(node, *vmid),
        ActionOp::ResizeCtDisk {
            node,
            vmid,
            disk,
            size,
        } => hypervisor(providers, kind)?.resize_ct_disk(node, *vmid, disk, size),
        ActionOp::StartCt { node, vmid } => hypervisor(providers, kind)?.start_ct(node, *vmid),
        ActionOp::StopCt { node, vmid } => hypervisor(providers, kind)?.stop_ct(node, *vmid),
        ActionOp::DeleteCt { node, vmid, purge } => {
            hypervisor(providers, kind)?.delete_ct(node, *vmid, *purge)
        }

        // Guest operations
        ActionOp::CreateSnapshot {
            guest,
            node,
            vmid,
            name,
            description,
            include_ram,
        } => hypervisor(providers, kind)?.create_snapshot(
            *guest,
            node,
            *vmid,
            name,
            description.as_deref(),
            *include_ram,
        ),
        ActionOp::DeleteSnapshot {
            guest,
            node,
            vmid,
            name,
        } => hypervisor(providers, kind)?.delete_snapshot(*guest, node, *vmid, name),
        ActionOp::MigrateGuest {
            guest,
            node,
            vmid,
            target,
            online,
        } => hypervisor(providers, kind)?.migrate_guest(*guest, node, *vmid, target, *online),
        ActionOp::BackupGuest {
            guest,
            node,
            vmid,
            storage,
            mode,
        } => hypervisor(providers, kind)?.backup_guest(*guest, node, *vmid, storage, *mode),
        ActionOp::RestoreGuest {
            guest,
            node,
            vmid,
            archive,
            storage,
            force,
        } => hypervisor(providers, kind)?.restore_guest(
            *guest,
            node,
            *vmid,
            archive,
            storage.as_deref(),
            *force,
        ),

        // Cluster services
        ActionOp::CreateBackupJob { job } => hypervisor(providers, kind)?.create_backup_job(job),
        ActionOp::UpdateBackupJob { job, changes } => {
            hypervisor(providers, kind)?.update_backup_job(job, changes)
        }
        ActionOp::DeleteBackupJob { id } => hypervisor(providers, kind)?.delete_backup_job(id),
        ActionOp::CreateReplicationJob { job } => {
            hypervisor(providers, kind)?.create_replication_job(job)
        }
        ActionOp::UpdateReplicationJob { job, changes } => {
            hypervisor(providers, kind)?.update_replication_job(job, changes)
        }
        ActionOp::DeleteReplicationJob { id } => {
            hypervisor(providers, kind)?.delete_replication_job(id)
        }
        ActionOp::CreateHaGroup { group } => hypervisor(providers, kind)?.create_ha_group(group),
        ActionOp::UpdateHaGroup { group, changes } => {
            hypervisor(providers, kind)?.update_ha_group(group, changes)
        }
        ActionOp::DeleteHaGroup { group } => hypervisor(providers, kind)?.delete_ha_group(group),
        ActionOp::CreateHaResource { resource } => {
            hypervisor(providers, kind)?.create_ha_resource(resource)
        }
        ActionOp::UpdateHaResource { resource, changes } => {
            hypervisor(providers, kind)?.update_ha_resource(resource, changes)
        }
        ActionOp::DeleteHaResource { sid } => hypervisor(providers, kind)?.delete_ha_resource(sid),

        // Firewall
        ActionOp::CreateFirewallRule { rule } => {
            hypervisor(providers, kind)?.create_firewall_rule(rule)
        }
        ActionOp::UpdateFirewallRule { rule, changes } => {
            hypervisor(providers, kind)?.update_firewall_rule(rule, changes)
        }
        ActionOp::DeleteFirewallRule { rule } => {
            hypervisor(providers, kind)?.delete_firewall_rule(rule)
        }
        ActionOp::CreateFirewallAlias { alias } => {
            hypervisor(providers, kind)?.create_firewall_alias(alias)
        }
        ActionOp::UpdateFirewallAlias { alias, changes } => {
            hypervisor(providers, kind)?.update_firewall_alias(alias, changes)
        }
        ActionOp::DeleteFirewallAlias { name } => {
            hypervisor(providers, kind)?.delete_firewall_alias(name)
        }

        // Nodes
        ActionOp::RebootNode { node, payload } => {
            hypervisor(providers, kind)?.reboot_node(node, payload.as_ref())
        }
        ActionOp::ShutdownNode { node, payload } => {
            hypervisor(providers, kind)?.shutdown_node(node, payload.as_ref())
        }

        // Container workloads
        ActionOp::CreateStack { stack } => containers(providers, kind)?.create_stack(stack),
        ActionOp::UpdateStack { id, stack, changes } => {
            containers(providers, kind)?.update_stack(*id, stack, changes)
        }
        ActionOp::RedeployStack {
            id,
            endpoint_id,
            name,
            revision,
        } => containers(providers, kind)?.redeploy_stack(
            *id,
            *endpoint_id,
            name,
            revision.as_deref(),
        ),
        ActionOp::DeleteStack {
            id,
            endpoint_id,
            name,
        } => containers(providers, kind)?.delete_stack(*id, *endpoint_id, name),

        // Observability
        ActionOp::CreateFolder { folder } => observability(providers, kind)?.create_folder(folder),
        ActionOp::UpdateFolder {
            uid,
            folder,
            changes,
        } => observability(providers, kind)?.update_folder(uid, folder, changes),
        ActionOp::DeleteFolder { uid } => observability(providers, kind)?.delete_folder(uid),
        ActionOp::CreateDatasource { datasource } => {
            observability(providers, kind)?.create_datasource(datasource)
        }
        ActionOp::UpdateDatasource {
            uid,
            datasource,
            changes,
        } => observability(providers, kind)?.update_datasource(uid, datasource, changes),
        ActionOp::DeleteDatasource { uid, name } => {
            observability(providers, kind)?.delete_datasource(uid, name)
        }
        ActionOp::CreateDashboard { dashboard } => {
            observability(providers, kind)?.create_dashboard(dashboard)
        }
        ActionOp::UpdateDashboard {
            uid,
            dashboard,
            changes,
        } => observability(providers, kind)?.update_dashboard(uid, dashboard, changes),
        ActionOp::DeleteDashboard { uid } => observability(providers, kind)?.delete_dashboard(uid),

        // Ad hoc passthrough
        ActionOp::HypervisorRequest { request } => {
            let provider = hypervisor(providers, kind)?;
            sanitized(Backend::Hypervisor, request)
                .and_then(|req| provider.request(&req))
                .map(Outcome::value)
        }
        ActionOp::ContainerRequest { request } => {
            let provider = containers(providers, kind)?;
            sanitized(Backend::Containers, request)
                .and_then(|req| provider.request(&req))
                .map(Outcome::value)
        }
        ActionOp::ObservabilityRequest { request } => {
            let provider = observability(providers, kind)?;
            sanitized(Backend::Observability, request)
                .and_then(|req| provider.request(&req))
                .map(Outcome::value)
        }
    };

    Ok(outcome)
}
