//! Guest checks: cross-domain conflicts, disk sizes and explicit deletes

use std::collections::{HashMap, HashSet};

use super::PreflightReport;
use crate::model::{CurrentState, DesiredSpec, DiskSpec, GuestKind, InstanceState};
use crate::size::parse_size;

/// The same guest id managed by mutually exclusive domains
pub(super) fn check_conflicts(d: &DesiredSpec, report: &mut PreflightReport) {
    let vms: HashSet<u32> = d
        .vms
        .iter()
        .filter(|v| v.ensure.is_present())
        .map(|v| v.vmid)
        .collect();
    let cts: HashSet<u32> = d
        .containers
        .iter()
        .filter(|c| c.ensure.is_present())
        .map(|c| c.vmid)
        .collect();
    let provisioned = |guest: GuestKind, vmid: u32| match guest {
        GuestKind::Vm => vms.contains(&vmid),
        GuestKind::Ct => cts.contains(&vmid),
    };

    let mut shared: Vec<u32> = vms.intersection(&cts).copied().collect();
    shared.sort_unstable();
    for vmid in shared {
        report.error(format!("Guest {vmid} is declared both in vms and in containers"));
    }

    let mut deleted = HashSet::new();
    for (i, spec) in d.deletes.iter().enumerate() {
        deleted.insert((spec.guest, spec.vmid));
        if provisioned(spec.guest, spec.vmid) {
            report.error(format!(
                "deletes[{i}]: {} {} is also provisioned in {}",
                spec.guest.as_str(),
                spec.vmid,
                domain_of(spec.guest)
            ));
        }
    }
    let removed = |guest: GuestKind, vmid: u32| {
        deleted.contains(&(guest, vmid))
            || match guest {
                GuestKind::Vm => d.vms.iter().any(|v| v.vmid == vmid && v.ensure.is_absent()),
                GuestKind::Ct => d.containers.iter().any(|c| c.vmid == vmid && c.ensure.is_absent()),
            }
    };

    for (i, spec) in d.restores.iter().enumerate() {
        if provisioned(spec.guest, spec.vmid) {
            report.error(format!(
                "restores[{i}]: {} is also provisioned in {}; restore and provisioning cannot both own it",
                spec.vmid,
                domain_of(spec.guest)
            ));
        }
    }

    for (i, spec) in d.migrations.iter().enumerate() {
        if removed(spec.guest, spec.vmid) {
            report.error(format!("migrations[{i}]: {} is also marked for deletion", spec.vmid));
        }
    }

    for (i, spec) in d.snapshots.iter().enumerate() {
        if spec.ensure.is_present() && removed(spec.guest, spec.vmid) {
            report.error(format!(
                "snapshots[{i}]: snapshot {} of {} is declared but the guest is marked for deletion",
                spec.name, spec.vmid
            ));
        }
    }
}

fn domain_of(guest: GuestKind) -> &'static str {
    match guest {
        GuestKind::Vm => "vms",
        GuestKind::Ct => "containers",
    }
}

/// Size syntax, duplicate disk keys and requested shrinks
pub(super) fn check_disks(current: &CurrentState, d: &DesiredSpec, report: &mut PreflightReport) {
    for (i, vm) in d.vms.iter().enumerate() {
        let label = format!("vms[{i}] (VM {})", vm.vmid);
        check_guest_disks(&label, &vm.disks, current.vm(vm.vmid), report);
        if let Some(clone) = &vm.clone
            && clone.source == vm.vmid
        {
            report.error(format!("{label}: clone source is the VM itself"));
        }
    }

    for (i, ct) in d.containers.iter().enumerate() {
        let label = format!("containers[{i}] (container {})", ct.vmid);
        let existing = current.container(ct.vmid);
        check_guest_disks(&label, &ct.disks, existing, report);

        if let Some(existing) = existing {
            for disk in &ct.disks {
                if existing.disk(&disk.key()).is_none() {
                    report.warn(format!(
                        "{label}: mount point {} does not exist and will not be attached",
                        disk.key()
                    ));
                }
            }
        }
    }
}

fn check_guest_disks(
    label: &str,
    disks: &[DiskSpec],
    existing: Option<&InstanceState>,
    report: &mut PreflightReport,
) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for disk in disks {
        *counts.entry(disk.key()).or_default() += 1;
    }
    let mut dupes: Vec<_> = counts.into_iter().filter(|(_, n)| *n > 1).map(|(k, _)| k).collect();
    dupes.sort();
    for key in dupes {
        report.error(format!("{label}: Duplicate disk key {key}"));
    }

    for disk in disks {
        let key = disk.key();
        let want = match parse_size(&disk.size) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.error(format!("{label}: invalid size '{}' for {key}: {e}", disk.size));
                continue;
            }
        };

        let Some(current) = existing.and_then(|g| g.disk(&key)) else {
            continue;
        };
        if let Ok(have) = parse_size(&current.size)
            && want < have
        {
            report.warn(format!(
                "{label}: {key} is {} but {} is declared; shrink is not supported and will be skipped",
                current.size, disk.size
            ));
        }
    }
}

/// Explicit deletes that match nothing
pub(super) fn check_deletes(current: &CurrentState, d: &DesiredSpec, report: &mut PreflightReport) {
    for (i, spec) in d.deletes.iter().enumerate() {
        if current.guest(spec.guest, spec.vmid).is_none() {
            report.warn(format!(
                "deletes[{i}]: {} {} not found; nothing to delete",
                spec.guest.as_str(),
                spec.vmid
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(current: serde_json::Value, desired: serde_json::Value) -> PreflightReport {
        let current: CurrentState = serde_json::from_value(current).unwrap();
        let desired: DesiredSpec = serde_json::from_value(desired).unwrap();
        let mut report = PreflightReport::default();
        check_conflicts(&desired, &mut report);
        check_disks(&current, &desired, &mut report);
        check_deletes(&current, &desired, &mut report);
        report
    }

    #[test]
    fn test_provision_and_delete_conflict() {
        let report = run(
            json!({}),
            json!({
                "vms": [{"vmid": 999, "node": "pve1"}],
                "deletes": [{"vmid": 999}, {"vmid": 999, "guest": "ct"}]
            }),
        );
        assert_eq!(report.errors, vec!["deletes[0]: vm 999 is also provisioned in vms"]);
    }

    #[test]
    fn test_vm_and_container_share_id() {
        let report = run(
            json!({}),
            json!({
                "vms": [{"vmid": 150, "node": "pve1"}],
                "containers": [{"vmid": 150, "node": "pve1"}]
            }),
        );
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("both in vms and in containers"));
    }

    #[test]
    fn test_disk_errors_and_shrink_warning() {
        let current = json!({"vms": [{"vmid": 100, "node": "pve1", "status": "running",
                                      "disks": [{"interface": "scsi", "index": 0, "size": "64G"}]}]});
        let desired = json!({"vms": [{"vmid": 100, "node": "pve1", "disks": [
            {"interface": "scsi", "index": 0, "size": "32G"},
            {"interface": "scsi", "index": 1, "size": "huge"},
            {"interface": "scsi", "index": 1, "size": "8G"}
        ]}]});

        let report = run(current, desired);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("Duplicate disk key scsi1")));
        assert!(report.errors.iter().any(|e| e.contains("invalid size 'huge'")));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("shrink is not supported"));
    }

    #[test]
    fn test_snapshot_of_deleted_guest() {
        let report = run(
            json!({"vms": [{"vmid": 300, "node": "pve1", "status": "stopped"}]}),
            json!({
                "vms": [{"vmid": 300, "node": "pve1", "ensure": "absent"}],
                "snapshots": [{"node": "pve1", "vmid": 300, "name": "keep"}]
            }),
        );
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("snapshots[0]"));
    }

    #[test]
    fn test_missing_delete_target_warns() {
        let report = run(json!({}), json!({"deletes": [{"vmid": 404}]}));
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings, vec!["deletes[0]: vm 404 not found; nothing to delete"]);
    }
}
