//! VM and container provisioning, config drift, disks and power

use std::collections::HashSet;

use serde_json::{Value, json};

use super::{PlanContext, Phases};
use crate::model::{
    ActionOp, ConfigChange, CtSpec, DiskSpec, GuestKind, InstanceState, PlanAction, PowerState,
    VmSpec,
};
use crate::size::parse_size;

pub(super) fn plan_vms(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for vm in &ctx.desired.vms {
        if !seen.insert(vm.vmid) || vm.ensure.is_absent() {
            // Absent VMs are deleted with the explicit deletes
            continue;
        }

        match ctx.current.vm(vm.vmid) {
            None => plan_new_vm(ctx, vm, phases),
            Some(existing) => plan_existing_vm(ctx, vm, existing, phases),
        }
    }
}

fn plan_new_vm(ctx: &PlanContext<'_>, vm: &VmSpec, phases: &mut Phases) {
    match &vm.clone {
        Some(clone) => {
            let mut reason = format!("VM {} is declared but missing (clone of {})", vm.vmid, clone.source);
            if let Some(storage) = &clone.target_storage {
                reason = ctx
                    .capacity
                    .annotate(reason, ctx.current, storage, Some(&vm.node));
            }
            phases.vm_create.push(PlanAction::new(
                ActionOp::CloneVm {
                    node: vm.node.clone(),
                    source: clone.source,
                    vmid: vm.vmid,
                    name: vm.name.clone(),
                    target_storage: clone.target_storage.clone(),
                    full: clone.full,
                },
                reason,
            ));

            // The clone inherits the template's config; apply what is declared
            let changes = vm_changes(vm, None);
            if !changes.is_empty() {
                phases.vm_config.push(PlanAction::new(
                    ActionOp::UpdateVmConfig {
                        node: vm.node.clone(),
                        vmid: vm.vmid,
                        changes,
                    },
                    format!("configure cloned VM {}", vm.vmid),
                ));
            }
        }
        None => phases.vm_create.push(PlanAction::new(
            ActionOp::CreateVm { vm: vm.clone() },
            format!("VM {} is declared but missing", vm.vmid),
        )),
    }

    if vm.power == Some(PowerState::Running) {
        phases.vm_power.push(PlanAction::new(
            ActionOp::StartVm {
                node: vm.node.clone(),
                vmid: vm.vmid,
            },
            format!("new VM {} should be running", vm.vmid),
        ));
    }
}

fn plan_existing_vm(ctx: &PlanContext<'_>, vm: &VmSpec, existing: &InstanceState, phases: &mut Phases) {
    // Operate where the guest lives now; migrations move it afterwards
    let node = existing.node.clone();
    let vmid = vm.vmid;

    let changes = vm_changes(vm, Some(existing));
    if !changes.is_empty() {
        let needs_reboot = changes.iter().any(|c| c.requires_reboot);
        let fields = super::diff::describe(&changes);
        phases.vm_config.push(PlanAction::new(
            ActionOp::UpdateVmConfig {
                node: node.clone(),
                vmid,
                changes,
            },
            format!("VM {vmid} drifted: {fields}"),
        ));

        if needs_reboot && existing.is_running() && vm.power != Some(PowerState::Stopped) {
            phases.vm_config.push(PlanAction::new(
                ActionOp::RebootVm {
                    node: node.clone(),
                    vmid,
                },
                format!("VM {vmid} must restart to apply {fields}"),
            ));
        }
    }

    plan_vm_disks(vm, existing, &node, phases);
    plan_vm_power(ctx, vm, existing, &node, phases);
}

fn plan_vm_disks(vm: &VmSpec, existing: &InstanceState, node: &str, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for disk in &vm.disks {
        let key = disk.key();
        if !seen.insert(key.clone()) {
            continue;
        }

        match existing.disk(&key) {
            None => phases.vm_disks.push(PlanAction::new(
                ActionOp::AttachDisk {
                    node: node.to_string(),
                    vmid: vm.vmid,
                    disk: disk.clone(),
                },
                format!("VM {} is missing disk {key}", vm.vmid),
            )),
            Some(current) => {
                if let Some(action) = grow_action(disk, &current.size, |size| {
                    ActionOp::ResizeDisk {
                        node: node.to_string(),
                        vmid: vm.vmid,
                        disk: key.clone(),
                        size,
                    }
                }) {
                    phases.vm_disks.push(action);
                }
            }
        }
    }
}

/// Resize action when the declared size is strictly larger than the current one
///
/// Shrinking is never planned, and unparsable sizes are left to preflight.
fn grow_action(
    disk: &DiskSpec,
    current_size: &str,
    build: impl FnOnce(String) -> ActionOp,
) -> Option<PlanAction> {
    let want = parse_size(&disk.size).ok()?;
    let have = parse_size(current_size).ok()?;
    if want <= have {
        return None;
    }

    Some(PlanAction::new(
        build(disk.size.clone()),
        format!("grow {} from {current_size} to {}", disk.key(), disk.size),
    ))
}

fn plan_vm_power(
    ctx: &PlanContext<'_>,
    vm: &VmSpec,
    existing: &InstanceState,
    node: &str,
    phases: &mut Phases,
) {
    let vmid = vm.vmid;
    match (vm.power, existing.status.as_str()) {
        (Some(PowerState::Running), "stopped") => phases.vm_power.push(PlanAction::new(
            ActionOp::StartVm {
                node: node.to_string(),
                vmid,
            },
            format!("VM {vmid} is stopped, should be running"),
        )),
        (Some(PowerState::Running), status @ ("paused" | "suspended")) => {
            phases.vm_power.push(PlanAction::new(
                ActionOp::ResumeVm {
                    node: node.to_string(),
                    vmid,
                },
                format!("VM {vmid} is {status}, should be running"),
            ));
        }
        (Some(PowerState::Stopped), status @ ("running" | "paused" | "suspended")) => {
            if vm.risky {
                let name = format!("safety-{}", ctx.now.format("%Y%m%d%H%M%S"));
                phases.vm_power.push(PlanAction::new(
                    ActionOp::CreateSnapshot {
                        guest: GuestKind::Vm,
                        node: node.to_string(),
                        vmid,
                        name,
                        description: Some("taken before planned stop".to_string()),
                        include_ram: false,
                    },
                    format!("VM {vmid} is marked risky; snapshot before stopping"),
                ));
            }
            phases.vm_power.push(PlanAction::new(
                ActionOp::StopVm {
                    node: node.to_string(),
                    vmid,
                },
                format!("VM {vmid} is {status}, should be stopped"),
            ));
        }
        _ => {}
    }
}

/// Declared VM fields that differ from the current instance
///
/// With no current instance every declared field is reported (clone setup).
pub(crate) fn vm_changes(vm: &VmSpec, current: Option<&InstanceState>) -> Vec<ConfigChange> {
    let mut changes = Vec::new();
    let cur = current.cloned().unwrap_or_default();

    push_change(&mut changes, "name", vm.name.as_ref().map(|v| json!(v)), json!(cur.name), false);
    push_change(&mut changes, "cores", vm.cores.map(|v| json!(v)), json!(cur.cores), true);
    push_change(&mut changes, "sockets", vm.sockets.map(|v| json!(v)), json!(cur.sockets), true);
    push_change(&mut changes, "memory", vm.memory.map(|v| json!(v)), json!(cur.memory), true);
    push_change(&mut changes, "cpu", vm.cpu.as_ref().map(|v| json!(v)), json!(cur.cpu), true);
    push_change(
        &mut changes,
        "tags",
        vm.tags.as_ref().map(|t| json!(sorted(t))),
        json!(sorted(&cur.tags)),
        false,
    );
    push_change(&mut changes, "bridges", vm.bridges.as_ref().map(|v| json!(v)), json!(cur.bridges), true);
    push_change(&mut changes, "onboot", vm.onboot.map(|v| json!(v)), json!(cur.onboot), false);
    push_change(
        &mut changes,
        "description",
        vm.description.as_ref().map(|v| json!(v)),
        json!(cur.description),
        false,
    );

    changes
}

/// Declared container fields that differ from the current instance
pub(crate) fn ct_changes(ct: &CtSpec, cur: &InstanceState) -> Vec<ConfigChange> {
    let mut changes = Vec::new();

    push_change(&mut changes, "hostname", ct.hostname.as_ref().map(|v| json!(v)), json!(cur.hostname), false);
    push_change(&mut changes, "cores", ct.cores.map(|v| json!(v)), json!(cur.cores), false);
    push_change(&mut changes, "memory", ct.memory.map(|v| json!(v)), json!(cur.memory), false);
    push_change(&mut changes, "swap", ct.swap.map(|v| json!(v)), json!(cur.swap), false);
    push_change(
        &mut changes,
        "tags",
        ct.tags.as_ref().map(|t| json!(sorted(t))),
        json!(sorted(&cur.tags)),
        false,
    );
    push_change(&mut changes, "bridges", ct.bridges.as_ref().map(|v| json!(v)), json!(cur.bridges), true);
    push_change(&mut changes, "onboot", ct.onboot.map(|v| json!(v)), json!(cur.onboot), false);

    changes
}

fn push_change(
    changes: &mut Vec<ConfigChange>,
    path: &str,
    desired: Option<Value>,
    current: Value,
    requires_reboot: bool,
) {
    if let Some(desired) = desired
        && desired != current
    {
        changes.push(ConfigChange::new(path, current, desired).with_reboot(requires_reboot));
    }
}

fn sorted(values: &[String]) -> Vec<String> {
    let mut out = values.to_vec();
    out.sort();
    out
}

pub(super) fn plan_containers(ctx: &PlanContext<'_>, phases: &mut Phases) {
    let mut seen = HashSet::new();

    for ct in &ctx.desired.containers {
        if !seen.insert(ct.vmid) || ct.ensure.is_absent() {
            continue;
        }

        let Some(existing) = ctx.current.container(ct.vmid) else {
            phases.ct_create.push(PlanAction::new(
                ActionOp::CreateCt { ct: ct.clone() },
                format!("container {} is declared but missing", ct.vmid),
            ));
            if ct.power == Some(PowerState::Running) {
                phases.ct_power.push(PlanAction::new(
                    ActionOp::StartCt {
                        node: ct.node.clone(),
                        vmid: ct.vmid,
                    },
                    format!("new container {} should be running", ct.vmid),
                ));
            }
            continue;
        };

        let node = existing.node.clone();
        let vmid = ct.vmid;

        let changes = ct_changes(ct, existing);
        if !changes.is_empty() {
            let needs_reboot = changes.iter().any(|c| c.requires_reboot);
            let fields = super::diff::describe(&changes);
            phases.ct_update.push(PlanAction::new(
                ActionOp::UpdateCtConfig {
                    node: node.clone(),
                    vmid,
                    changes,
                },
                format!("container {vmid} drifted: {fields}"),
            ));

            if needs_reboot && existing.is_running() && ct.power != Some(PowerState::Stopped) {
                phases.ct_update.push(PlanAction::new(
                    ActionOp::RebootCt {
                        node: node.clone(),
                        vmid,
                    },
                    format!("container {vmid} must restart to apply {fields}"),
                ));
            }
        }

        // Container volumes can only grow; new mount points are not attached here
        let mut seen_disks = HashSet::new();
        for disk in &ct.disks {
            let key = disk.key();
            if !seen_disks.insert(key.clone()) {
                continue;
            }
            if let Some(current) = existing.disk(&key)
                && let Some(action) = grow_action(disk, &current.size, |size| ActionOp::ResizeCtDisk {
                    node: node.clone(),
                    vmid,
                    disk: key.clone(),
                    size,
                })
            {
                phases.ct_update.push(action);
            }
        }

        match (ct.power, existing.status.as_str()) {
            (Some(PowerState::Running), "stopped") => phases.ct_power.push(PlanAction::new(
                ActionOp::StartCt {
                    node: node.clone(),
                    vmid,
                },
                format!("container {vmid} is stopped, should be running"),
            )),
            (Some(PowerState::Stopped), "running") => phases.ct_power.push(PlanAction::new(
                ActionOp::StopCt { node, vmid },
                format!("container {vmid} is running, should be stopped"),
            )),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiskState;

    fn vm(vmid: u32) -> VmSpec {
        VmSpec {
            vmid,
            node: "pve1".into(),
            ensure: Default::default(),
            name: None,
            cores: None,
            sockets: None,
            memory: None,
            cpu: None,
            tags: None,
            bridges: None,
            onboot: None,
            description: None,
            disks: Vec::new(),
            power: None,
            risky: false,
            clone: None,
        }
    }

    fn instance(vmid: u32, status: &str) -> InstanceState {
        InstanceState {
            vmid,
            node: "pve1".into(),
            status: status.into(),
            cores: Some(2),
            memory: Some(2048),
            tags: vec!["web".into(), "prod".into()],
            bridges: vec!["vmbr0".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_vm_changes_reboot_flags() {
        let mut desired = vm(100);
        desired.cores = Some(4);
        desired.onboot = Some(true);
        desired.tags = Some(vec!["prod".into(), "web".into()]);

        let changes = vm_changes(&desired, Some(&instance(100, "running")));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, "cores");
        assert!(changes[0].requires_reboot);
        assert_eq!(changes[1].path, "onboot");
        assert!(!changes[1].requires_reboot);
    }

    #[test]
    fn test_ct_bridge_change_requires_reboot() {
        let ct = CtSpec {
            vmid: 200,
            node: "pve1".into(),
            ensure: Default::default(),
            hostname: None,
            ostemplate: None,
            cores: Some(4),
            memory: None,
            swap: None,
            tags: None,
            bridges: Some(vec!["vmbr1".into()]),
            onboot: None,
            unprivileged: None,
            disks: Vec::new(),
            power: None,
            risky: false,
        };
        let changes = ct_changes(&ct, &instance(200, "running"));
        assert_eq!(changes.len(), 2);
        assert!(!changes[0].requires_reboot);
        assert!(changes[1].requires_reboot);
    }

    #[test]
    fn test_grow_only() {
        let disk = |size: &str| DiskSpec {
            interface: "scsi".into(),
            index: 0,
            storage: None,
            size: size.into(),
        };
        let build = |size: String| ActionOp::ResizeDisk {
            node: "pve1".into(),
            vmid: 100,
            disk: "scsi0".into(),
            size,
        };

        assert!(grow_action(&disk("64G"), "32G", build).is_some());
        assert!(grow_action(&disk("32G"), "32768M", build).is_none());
        assert!(grow_action(&disk("16G"), "32G", build).is_none());
        assert!(grow_action(&disk("lots"), "32G", build).is_none());
    }

    #[test]
    fn test_existing_disk_lookup_uses_interface_and_index() {
        let mut existing = instance(100, "running");
        existing.disks = vec![DiskState {
            interface: "scsi".into(),
            index: 1,
            storage: Some("local-lvm".into()),
            size: "10G".into(),
        }];
        assert!(existing.disk("scsi1").is_some());
        assert!(existing.disk("scsi0").is_none());
    }
}
