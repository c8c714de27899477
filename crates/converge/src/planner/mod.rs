//! Planner: (current state, desired spec) → ordered plan
//!
//! Planning is a pure function. Each domain is diffed on its own and its
//! actions are appended to a fixed phase; the plan is the concatenation of
//! the phases in this order:
//!
//! | # | Phase | Contents |
//! |---|-------|----------|
//! | 1 | access | roles, groups, users, tokens, pools, ACL grants |
//! | 2 | network | interfaces (+ reload per node), SDN zones/vnets/subnets (+ apply) |
//! | 3 | storage | storage pools, storage definitions |
//! | 4 | VM create | create / clone |
//! | 5 | VM config | config updates (+ reboot) |
//! | 6 | VM disks | attach, grow, disk moves, volume copies |
//! | 7 | CT create | |
//! | 8 | CT update | config updates (+ reboot), volume growth |
//! | 9 | VM power | start, resume, safety snapshot + stop |
//! | 10 | CT power | start, stop |
//! | 11 | instance ops | snapshots, migrations, backups, restores |
//! | 12 | cluster services | backup/replication jobs, HA groups/resources |
//! | 13 | application | stacks, folders, datasources, dashboards |
//! | 14 | firewall | aliases, rules |
//! | 15 | config deletes | application, firewall, cluster, access, network, storage |
//! | 16 | entity deletes | snapshots, guests |
//! | 17 | node operations | reboot / shutdown |
//! | 18 | ad hoc | raw requests per backend |
//!
//! Adds and updates come before deletes in every domain, and the widest-blast
//! mutations sit at the tail. Entities declared in conflicting domains are not
//! resolved here; preflight reports them.

mod capacity;
mod compute;
mod config;
pub mod diff;
mod ops;

use chrono::{DateTime, Utc};

pub use capacity::{
    AVAILABLE_FIELDS, CapacityPolicy, ELEVATED_UTILIZATION, HIGH_UTILIZATION, TOTAL_FIELDS,
    USED_FIELDS,
};

use crate::model::{CurrentState, DesiredSpec, Plan, PlanAction};

/// Build a plan with the default capacity policy, stamped with the current time
pub fn build_plan(current: &CurrentState, desired: &DesiredSpec) -> Plan {
    Planner::default().plan(current, desired)
}

/// Plan builder
#[derive(Debug, Clone, Default)]
pub struct Planner {
    pub capacity: CapacityPolicy,
}

impl Planner {
    pub fn new(capacity: CapacityPolicy) -> Self {
        Self { capacity }
    }

    pub fn plan(&self, current: &CurrentState, desired: &DesiredSpec) -> Plan {
        self.plan_at(current, desired, Utc::now())
    }

    /// Build a plan as of `now`
    ///
    /// `now` stamps the plan and names safety snapshots and decides backup
    /// freshness, so a fixed `now` makes the plan fully reproducible.
    pub fn plan_at(&self, current: &CurrentState, desired: &DesiredSpec, now: DateTime<Utc>) -> Plan {
        let mut phases = Phases::default();
        let ctx = PlanContext {
            current,
            desired,
            capacity: &self.capacity,
            now,
        };

        config::plan_access(&ctx, &mut phases);
        config::plan_network(&ctx, &mut phases);
        config::plan_storage(&ctx, &mut phases);
        compute::plan_vms(&ctx, &mut phases);
        ops::plan_disk_moves(&ctx, &mut phases);
        ops::plan_volume_copies(&ctx, &mut phases);
        compute::plan_containers(&ctx, &mut phases);
        ops::plan_snapshots(&ctx, &mut phases);
        ops::plan_migrations(&ctx, &mut phases);
        ops::plan_backups(&ctx, &mut phases);
        ops::plan_restores(&ctx, &mut phases);
        config::plan_cluster_services(&ctx, &mut phases);
        config::plan_applications(&ctx, &mut phases);
        config::plan_firewall(&ctx, &mut phases);
        ops::plan_entity_deletes(&ctx, &mut phases);
        ops::plan_node_actions(&ctx, &mut phases);
        ops::plan_crud(&ctx, &mut phases);

        let actions = phases.into_actions();
        log::debug!("Planned {} action(s) for {}", actions.len(), desired.env_name());

        Plan {
            generated_at: now,
            env: desired.env_name().to_string(),
            actions,
        }
    }
}

/// Inputs shared by every domain planner
pub(crate) struct PlanContext<'a> {
    pub current: &'a CurrentState,
    pub desired: &'a DesiredSpec,
    pub capacity: &'a CapacityPolicy,
    pub now: DateTime<Utc>,
}

/// Per-phase action buckets, concatenated in declaration order
#[derive(Default)]
pub(crate) struct Phases {
    pub access: Vec<PlanAction>,
    pub network: Vec<PlanAction>,
    pub storage: Vec<PlanAction>,
    pub vm_create: Vec<PlanAction>,
    pub vm_config: Vec<PlanAction>,
    pub vm_disks: Vec<PlanAction>,
    pub ct_create: Vec<PlanAction>,
    pub ct_update: Vec<PlanAction>,
    pub vm_power: Vec<PlanAction>,
    pub ct_power: Vec<PlanAction>,
    pub instance_ops: Vec<PlanAction>,
    pub cluster: Vec<PlanAction>,
    pub apps: Vec<PlanAction>,
    pub firewall: Vec<PlanAction>,
    pub app_deletes: Vec<PlanAction>,
    pub firewall_deletes: Vec<PlanAction>,
    pub cluster_deletes: Vec<PlanAction>,
    pub access_deletes: Vec<PlanAction>,
    pub network_deletes: Vec<PlanAction>,
    pub storage_deletes: Vec<PlanAction>,
    pub entity_deletes: Vec<PlanAction>,
    pub nodes: Vec<PlanAction>,
    pub crud: Vec<PlanAction>,
}

impl Phases {
    fn into_actions(self) -> Vec<PlanAction> {
        [
            self.access,
            self.network,
            self.storage,
            self.vm_create,
            self.vm_config,
            self.vm_disks,
            self.ct_create,
            self.ct_update,
            self.vm_power,
            self.ct_power,
            self.instance_ops,
            self.cluster,
            self.apps,
            self.firewall,
            self.app_deletes,
            self.firewall_deletes,
            self.cluster_deletes,
            self.access_deletes,
            self.network_deletes,
            self.storage_deletes,
            self.entity_deletes,
            self.nodes,
            self.crud,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
