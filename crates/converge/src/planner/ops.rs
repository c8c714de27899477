//! One-shot guest operations, explicit deletes, node actions and ad hoc calls

use std::collections::HashSet;

use super::{PlanContext, Phases};
use crate::model::{ActionOp, Backend, Declared, DiskMoveSpec, GuestKind, NodeAction, PlanAction};
use crate::policy::{Method, strip_confirmation};

pub(super) fn plan_disk_moves(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for spec in &ctx.desired.disk_moves {
        if !seen.insert(spec.key()) {
            continue;
        }
        let Some(vm) = ctx.current.vm(spec.vmid) else {
            log::debug!("Disk move {} skipped: VM {} not found", spec.key(), spec.vmid);
            continue;
        };
        let Some(disk) = vm.disk(&spec.disk) else {
            log::debug!("Disk move {} skipped: no such disk", spec.key());
            continue;
        };
        if disk.storage.as_deref() == Some(spec.target_storage.as_str()) {
            continue;
        }

        phases.vm_disks.push(PlanAction::new(
            move_op(spec, &vm.node),
            ctx.capacity.annotate(
                format!(
                    "disk {} of VM {} is on {}, should be on {}",
                    spec.disk,
                    spec.vmid,
                    disk.storage.as_deref().unwrap_or("unknown storage"),
                    spec.target_storage
                ),
                ctx.current,
                &spec.target_storage,
                Some(&vm.node),
            ),
        ));
    }
}

fn move_op(spec: &DiskMoveSpec, node: &str) -> ActionOp {
    ActionOp::MoveDisk {
        node: node.to_string(),
        vmid: spec.vmid,
        disk: spec.disk.clone(),
        target_storage: spec.target_storage.clone(),
        delete_source: spec.delete_source,
    }
}

pub(super) fn plan_volume_copies(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for spec in &ctx.desired.volume_copies {
        if !seen.insert(spec.key()) {
            continue;
        }
        let present = ctx.current.volumes.iter().any(|v| {
            v.node == spec.node && v.storage == spec.target_storage && v.volume == spec.volume
        });
        if present {
            continue;
        }

        phases.vm_disks.push(PlanAction::new(
            ActionOp::CopyVolume {
                node: spec.node.clone(),
                volume: spec.volume.clone(),
                source_storage: spec.source_storage.clone(),
                target_storage: spec.target_storage.clone(),
            },
            ctx.capacity.annotate(
                format!("{} is missing on {}", spec.volume, spec.target_storage),
                ctx.current,
                &spec.target_storage,
                Some(&spec.node),
            ),
        ));
    }
}

pub(super) fn plan_snapshots(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for spec in &ctx.desired.snapshots {
        let key = spec.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        let exists = ctx.current.snapshots.iter().any(|s| s.key() == key);

        match (spec.ensure.is_present(), exists) {
            (true, false) => phases.instance_ops.push(PlanAction::new(
                ActionOp::CreateSnapshot {
                    guest: spec.guest,
                    node: spec.node.clone(),
                    vmid: spec.vmid,
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    include_ram: spec.include_ram,
                },
                format!("snapshot {key} is declared but missing"),
            )),
            (false, true) => phases.entity_deletes.push(PlanAction::new(
                ActionOp::DeleteSnapshot {
                    guest: spec.guest,
                    node: spec.node.clone(),
                    vmid: spec.vmid,
                    name: spec.name.clone(),
                },
                format!("snapshot {key} is marked absent"),
            )),
            _ => {}
        }
    }
}

pub(super) fn plan_migrations(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for spec in &ctx.desired.migrations {
        if !seen.insert(spec.vmid) {
            continue;
        }
        let Some(guest) = ctx.current.guest(spec.guest, spec.vmid) else {
            log::debug!("Migration of {} skipped: guest not found", spec.vmid);
            continue;
        };
        if guest.node == spec.target {
            continue;
        }

        phases.instance_ops.push(PlanAction::new(
            ActionOp::MigrateGuest {
                guest: spec.guest,
                node: guest.node.clone(),
                vmid: spec.vmid,
                target: spec.target.clone(),
                online: spec.online,
            },
            format!("{} is on {}, should be on {}", spec.vmid, guest.node, spec.target),
        ));
    }
}

pub(super) fn plan_backups(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for spec in &ctx.desired.backups {
        if !seen.insert(spec.key()) {
            continue;
        }
        let fresh = ctx.current.backups.iter().any(|archive| {
            archive.vmid == spec.vmid
                && archive.storage == spec.storage
                && spec.is_satisfied_by(archive.created_at, ctx.now)
        });
        if fresh {
            continue;
        }

        phases.instance_ops.push(PlanAction::new(
            ActionOp::BackupGuest {
                guest: spec.guest,
                node: spec.node.clone(),
                vmid: spec.vmid,
                storage: spec.storage.clone(),
                mode: spec.mode,
            },
            format!(
                "no backup of {} on {} within {}h",
                spec.vmid, spec.storage, spec.max_age_hours
            ),
        ));
    }
}

pub(super) fn plan_restores(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for spec in &ctx.desired.restores {
        if !seen.insert(spec.vmid) {
            continue;
        }
        let exists = ctx.current.guest(spec.guest, spec.vmid).is_some();
        let reason = match (exists, spec.force) {
            (false, _) => format!("{} is missing; restore from {}", spec.vmid, spec.archive),
            (true, true) => format!("forced restore of {} from {}", spec.vmid, spec.archive),
            (true, false) => continue,
        };

        phases.instance_ops.push(PlanAction::new(
            ActionOp::RestoreGuest {
                guest: spec.guest,
                node: spec.node.clone(),
                vmid: spec.vmid,
                archive: spec.archive.clone(),
                storage: spec.storage.clone(),
                force: spec.force,
            },
            reason,
        ));
    }
}

/// Guests marked absent in vms/containers plus the explicit deletes domain
///
/// A guest named in both places is deleted once.
pub(super) fn plan_entity_deletes(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut done: HashSet<(GuestKind, u32)> = HashSet::new();
    let mut push = |guest: GuestKind, vmid: u32, purge: bool, reason: String| {
        let Some(existing) = ctx.current.guest(guest, vmid) else {
            return;
        };
        if !done.insert((guest, vmid)) {
            return;
        }
        let node = existing.node.clone();
        let op = match guest {
            GuestKind::Vm => ActionOp::DeleteVm { node, vmid, purge },
            GuestKind::Ct => ActionOp::DeleteCt { node, vmid, purge },
        };
        phases.entity_deletes.push(PlanAction::new(op, reason));
    };

    for vm in ctx.desired.vms.iter().filter(|v| v.ensure.is_absent()) {
        push(GuestKind::Vm, vm.vmid, false, format!("VM {} is marked absent", vm.vmid));
    }
    for ct in ctx.desired.containers.iter().filter(|c| c.ensure.is_absent()) {
        push(GuestKind::Ct, ct.vmid, false, format!("container {} is marked absent", ct.vmid));
    }
    for spec in &ctx.desired.deletes {
        let reason = format!("{} {} is listed for deletion", spec.guest.as_str(), spec.vmid);
        push(spec.guest, spec.vmid, spec.purge, reason);
    }
}

pub(super) fn plan_node_actions(ctx: &PlanContext<'_>, phases: &mut Phases) {
    for spec in &ctx.desired.node_actions {
        let node = spec.node.clone();
        let payload = spec.payload.as_ref().map(strip_confirmation);
        let (op, verb) = match spec.action {
            NodeAction::Reboot => (ActionOp::RebootNode { node, payload }, "reboot"),
            NodeAction::Shutdown => (ActionOp::ShutdownNode { node, payload }, "shutdown"),
        };
        phases
            .nodes
            .push(PlanAction::new(op, format!("operator requested {verb} of {}", spec.node)));
    }
}

pub(super) fn plan_crud(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let batches = [
        (Backend::Hypervisor, &ctx.desired.hypervisor_crud),
        (Backend::Containers, &ctx.desired.container_crud),
        (Backend::Observability, &ctx.desired.observability_crud),
    ];

    for (backend, entries) in batches {
        for spec in entries {
            let reason = spec.description.clone().unwrap_or_else(|| {
                let method = Method::parse(&spec.method)
                    .map_or_else(|| spec.method.to_uppercase(), |m| m.as_str().to_string());
                format!("ad hoc {method} {}", spec.path)
            });
            let request = spec.clone();
            let op = match backend {
                Backend::Hypervisor => ActionOp::HypervisorRequest { request },
                Backend::Containers => ActionOp::ContainerRequest { request },
                Backend::Observability => ActionOp::ObservabilityRequest { request },
            };
            phases.crud.push(PlanAction::new(op, reason));
        }
    }
}
