//! Per-scope rule tables for the hypervisor and container backends

use std::sync::LazyLock;

use regex::Regex;

use super::Method;
use crate::model::Backend;

/// A path pattern reserved for typed actions
pub struct DenyRule {
    pub pattern: Regex,
    /// Methods the rule applies to; empty means every method
    pub methods: &'static [Method],
    pub reason: &'static str,
}

impl DenyRule {
    pub(super) fn new(pattern: &str, methods: &'static [Method], reason: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("valid deny rule regex (verified by tests)"),
            methods,
            reason,
        }
    }

    fn applies(&self, method: Method, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.contains(&method)) && self.pattern.is_match(path)
    }
}

/// Allow-list, deny rules and high-risk classification for one backend
pub struct ScopeRules {
    /// Prefix prepended to paths that do not already carry it
    pub path_prefix: Option<&'static str>,
    pub allow: &'static [&'static str],
    pub deny: Vec<DenyRule>,
    pub high_risk: Vec<Regex>,
    /// Headers never forwarded to the backend
    pub dropped_headers: &'static [&'static str],
}

impl ScopeRules {
    pub fn for_scope(scope: Backend) -> &'static Self {
        match scope {
            Backend::Hypervisor => &HYPERVISOR,
            Backend::Containers => &CONTAINERS,
            Backend::Observability => &super::observability::OBSERVABILITY,
        }
    }

    pub fn allows(&self, path: &str) -> bool {
        self.allow
            .iter()
            .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
    }

    pub fn denied_by(&self, method: Method, path: &str) -> Option<&DenyRule> {
        self.deny.iter().find(|rule| rule.applies(method, path))
    }

    pub fn is_high_risk(&self, path: &str) -> bool {
        self.high_risk.iter().any(|re| re.is_match(path))
    }
}

pub(super) fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|p| Regex::new(p).expect("valid high-risk regex (verified by tests)"))
        .collect()
}

const WRITES: &[Method] = &[Method::Post, Method::Put, Method::Patch, Method::Delete];

static HYPERVISOR: LazyLock<ScopeRules> = LazyLock::new(|| ScopeRules {
    path_prefix: None,
    allow: &["/nodes", "/cluster", "/access", "/pools", "/storage", "/version"],
    deny: vec![
        DenyRule::new(
            r"^/nodes/[^/]+/(qemu|lxc)/\d+/status/(start|stop|shutdown|reboot|reset|suspend|resume)$",
            &[],
            "use the start/stop/reboot actions",
        ),
        DenyRule::new(
            r"^/nodes/[^/]+/(qemu|lxc)/\d+/migrate$",
            &[Method::Post],
            "use migrations",
        ),
        DenyRule::new(
            r"^/nodes/[^/]+/(startall|stopall|migrateall)$",
            &[],
            "bulk guest lifecycle is not exposed",
        ),
        DenyRule::new(
            r"^/nodes/[^/]+/(qemu|lxc)/\d+$",
            &[Method::Delete],
            "use deletes",
        ),
        DenyRule::new(
            r"^/nodes/[^/]+/qemu/\d+/(clone|move_disk|resize)$",
            WRITES,
            "use vms, disk_moves or disk sizes",
        ),
        DenyRule::new(
            r"^/nodes/[^/]+/lxc/\d+/(clone|move_volume|resize)$",
            WRITES,
            "use containers",
        ),
        DenyRule::new(
            r"^/nodes/[^/]+/(qemu|lxc)/\d+/snapshot$",
            &[Method::Post],
            "use snapshots",
        ),
        DenyRule::new(r"^/nodes/[^/]+/vzdump$", &[Method::Post], "use backups"),
    ],
    high_risk: patterns(&[
        r"^/access(/|$)",
        r"^/cluster/(ceph|config|ha|firewall|sdn)(/|$)",
        r"^/nodes/[^/]+/(disks|ceph)(/|$)",
        r"^/nodes/[^/]+/status$",
        r"^/storage(/|$)",
    ]),
    dropped_headers: &[],
});

static CONTAINERS: LazyLock<ScopeRules> = LazyLock::new(|| ScopeRules {
    path_prefix: None,
    allow: &[
        "/endpoints",
        "/stacks",
        "/registries",
        "/teams",
        "/users",
        "/settings",
    ],
    deny: vec![
        DenyRule::new(
            r"^/stacks/\d+/(start|stop)$",
            &[Method::Post],
            "stack lifecycle is managed through stacks",
        ),
        DenyRule::new(
            r"^/stacks/\d+/git/redeploy$",
            WRITES,
            "bump the stack revision",
        ),
        DenyRule::new(
            r"^/stacks/\d+$",
            &[Method::Put, Method::Delete],
            "use stacks",
        ),
        DenyRule::new(r"^/stacks/create(/|$)", &[Method::Post], "use stacks"),
    ],
    high_risk: patterns(&[
        r"^/users(/|$)",
        r"^/teams(/|$)",
        r"^/endpoints/\d+$",
        r"^/endpoints/\d+/docker/(volumes|system|swarm)(/|$)",
        r"^/registries(/|$)",
        r"^/settings(/|$)",
    ]),
    dropped_headers: &[],
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_tables_compile() {
        for scope in [Backend::Hypervisor, Backend::Containers, Backend::Observability] {
            let rules = ScopeRules::for_scope(scope);
            assert!(!rules.allow.is_empty());
            assert!(!rules.high_risk.is_empty());
        }
    }

    #[test]
    fn test_allow_list_respects_segment_boundaries() {
        assert!(HYPERVISOR.allows("/nodes"));
        assert!(HYPERVISOR.allows("/nodes/pve1/qemu"));
        assert!(!HYPERVISOR.allows("/nodesx"));
        assert!(!HYPERVISOR.allows("/"));
    }

    #[test]
    fn test_deny_rules_are_method_scoped() {
        assert!(
            HYPERVISOR
                .denied_by(Method::Delete, "/nodes/pve1/qemu/101")
                .is_some()
        );
        assert!(
            HYPERVISOR
                .denied_by(Method::Get, "/nodes/pve1/qemu/101")
                .is_none()
        );
        assert!(
            HYPERVISOR
                .denied_by(Method::Get, "/nodes/pve1/stopall")
                .is_some()
        );
    }

    #[test]
    fn test_container_high_risk() {
        assert!(CONTAINERS.is_high_risk("/endpoints/2/docker/volumes/prune"));
        assert!(CONTAINERS.is_high_risk("/users/3"));
        assert!(!CONTAINERS.is_high_risk("/endpoints/2/docker/containers/json"));
    }
}
