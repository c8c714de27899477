//! Advisory capacity hints for storage-bound actions
//!
//! Actions that write onto a storage (disk moves, volume copies, clones) get a
//! suffix on their reason when the destination is already busy. Hints never
//! block planning.

use serde::{Deserialize, Serialize};

use crate::model::{CurrentState, StorageUsage};

/// Utilization at or above which a destination is reported as elevated
pub const ELEVATED_UTILIZATION: f64 = 0.75;

/// Utilization at or above which a destination is reported as high
pub const HIGH_UTILIZATION: f64 = 0.90;

/// Field names scanners use for used bytes
pub const USED_FIELDS: &[&str] = &["used", "disk", "used_bytes"];

/// Field names scanners use for total bytes
pub const TOTAL_FIELDS: &[&str] = &["total", "maxdisk", "size", "total_bytes"];

/// Field names scanners use for available bytes
pub const AVAILABLE_FIELDS: &[&str] = &["avail", "available", "free", "available_bytes"];

/// Thresholds and field aliases used to read storage utilization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPolicy {
    pub elevated: f64,
    pub high: f64,
    pub used_fields: Vec<String>,
    pub total_fields: Vec<String>,
    pub available_fields: Vec<String>,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            elevated: ELEVATED_UTILIZATION,
            high: HIGH_UTILIZATION,
            used_fields: to_strings(USED_FIELDS),
            total_fields: to_strings(TOTAL_FIELDS),
            available_fields: to_strings(AVAILABLE_FIELDS),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

impl CapacityPolicy {
    /// Used fraction of a storage, if the figures allow computing it
    pub fn utilization(&self, usage: &StorageUsage) -> Option<f64> {
        let total = usage.number(&self.total_fields)?;
        if total <= 0.0 {
            return None;
        }

        let used = usage.number(&self.used_fields).or_else(|| {
            usage
                .number(&self.available_fields)
                .map(|avail| total - avail)
        })?;

        Some((used / total).clamp(0.0, 1.0))
    }

    /// Hint text for `storage`, or `None` when below the elevated threshold
    pub fn hint(&self, current: &CurrentState, storage: &str, node: Option<&str>) -> Option<String> {
        let usage = current.storage_usage.iter().find(|u| {
            u.storage == storage
                && match (u.node.as_deref(), node) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                }
        })?;
        let ratio = self.utilization(usage)?;

        let level = if ratio >= self.high {
            "high"
        } else if ratio >= self.elevated {
            "elevated"
        } else {
            return None;
        };

        Some(format!(
            "capacity hint: {storage} at {:.0}% ({level})",
            ratio * 100.0
        ))
    }

    /// Append the hint for `storage` to `reason`
    pub fn annotate(
        &self,
        reason: String,
        current: &CurrentState,
        storage: &str,
        node: Option<&str>,
    ) -> String {
        match self.hint(current, storage, node) {
            Some(hint) => format!("{reason} [{hint}]"),
            None => reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn usage(storage: &str, fields: serde_json::Value) -> StorageUsage {
        let mut value = fields;
        value["storage"] = json!(storage);
        serde_json::from_value(value).unwrap()
    }

    fn state(entries: Vec<StorageUsage>) -> CurrentState {
        CurrentState {
            storage_usage: entries,
            ..Default::default()
        }
    }

    #[test]
    fn test_utilization_aliases() {
        let policy = CapacityPolicy::default();
        let a = usage("a", json!({"used": 50, "total": 100}));
        let b = usage("b", json!({"disk": 80, "maxdisk": 100}));
        let c = usage("c", json!({"avail": 5, "size": 100}));
        let d = usage("d", json!({"free": "10"}));

        assert_eq!(policy.utilization(&a), Some(0.5));
        assert_eq!(policy.utilization(&b), Some(0.8));
        assert_eq!(policy.utilization(&c), Some(0.95));
        assert_eq!(policy.utilization(&d), None);
    }

    #[test]
    fn test_hint_levels() {
        let policy = CapacityPolicy::default();
        let current = state(vec![
            usage("low", json!({"used": 10, "total": 100})),
            usage("busy", json!({"used": 75, "total": 100})),
            usage("full", json!({"used": 95, "total": 100})),
        ]);

        assert_eq!(policy.hint(&current, "low", None), None);
        assert_eq!(
            policy.hint(&current, "busy", None).as_deref(),
            Some("capacity hint: busy at 75% (elevated)")
        );
        assert_eq!(
            policy.hint(&current, "full", None).as_deref(),
            Some("capacity hint: full at 95% (high)")
        );
        assert_eq!(policy.hint(&current, "missing", None), None);
    }

    #[test]
    fn test_annotate_and_custom_thresholds() {
        let policy = CapacityPolicy {
            elevated: 0.5,
            ..Default::default()
        };
        let current = state(vec![usage("nfs", json!({"used": 60, "total": 100}))]);
        let reason = policy.annotate("move scsi0".to_string(), &current, "nfs", Some("pve1"));
        assert_eq!(reason, "move scsi0 [capacity hint: nfs at 60% (elevated)]");
    }
}
