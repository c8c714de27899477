//! Generic keyed diff for config-object domains
//!
//! Desired and current entries are serialized to JSON and compared field by
//! field. Only fields the desired entry declares are compared, and nested
//! objects are compared as subsets, so server-populated extras never show up
//! as drift.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::model::{ConfigChange, Declared};

/// Fields that steer the planner rather than describe the remote object
const CONTROL_FIELDS: &[&str] = &["ensure", "confirm"];

/// Result of diffing one domain
pub struct DomainDiff<'a, T> {
    /// Desired-present entries with no current counterpart
    pub creates: Vec<&'a T>,
    /// (desired, current, changes) for entries that drifted
    pub updates: Vec<(&'a T, &'a T, Vec<ConfigChange>)>,
    /// (desired, current) for desired-absent entries that still exist
    pub deletes: Vec<(&'a T, &'a T)>,
}

impl<T> DomainDiff<'_, T> {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Diff a domain whose entries are matched by logical key
pub fn diff_keyed<'a, T>(desired: &'a [T], current: &'a [T], ignore: &[&str]) -> DomainDiff<'a, T>
where
    T: Declared + Serialize,
{
    diff_by(desired, current, ignore, |d, c| d.key() == c.key())
}

/// Diff a domain with a custom matcher
///
/// Entries repeating an earlier key are skipped; preflight reports them.
pub fn diff_by<'a, T, F>(
    desired: &'a [T],
    current: &'a [T],
    ignore: &[&str],
    same: F,
) -> DomainDiff<'a, T>
where
    T: Declared + Serialize,
    F: Fn(&T, &T) -> bool,
{
    let mut diff = DomainDiff {
        creates: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
    };
    let mut seen = HashSet::new();

    for entry in desired {
        if !seen.insert(entry.key()) {
            continue;
        }

        let existing = current.iter().find(|c| same(entry, c));
        match (entry.ensure().is_present(), existing) {
            (true, None) => diff.creates.push(entry),
            (true, Some(existing)) => {
                let changes = field_changes(entry, existing, ignore);
                if !changes.is_empty() {
                    diff.updates.push((entry, existing, changes));
                }
            }
            (false, Some(existing)) => diff.deletes.push((entry, existing)),
            (false, None) => {}
        }
    }

    diff
}

/// Field-level drift between two serializable entries
pub fn field_changes<T: Serialize>(desired: &T, current: &T, ignore: &[&str]) -> Vec<ConfigChange> {
    let (Ok(Value::Object(want)), Ok(have)) =
        (serde_json::to_value(desired), serde_json::to_value(current))
    else {
        return Vec::new();
    };

    want.iter()
        .filter(|(field, _)| {
            !CONTROL_FIELDS.contains(&field.as_str()) && !ignore.contains(&field.as_str())
        })
        .filter_map(|(field, value)| {
            let old = have.get(field).cloned().unwrap_or(Value::Null);
            if value_matches(value, &old) {
                None
            } else {
                Some(ConfigChange::new(field.clone(), old, value.clone()))
            }
        })
        .collect()
}

/// Whether `current` satisfies `desired`
///
/// Objects match when every desired key matches; arrays of scalars compare as
/// sets; numbers compare numerically.
pub fn value_matches(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Object(want), Value::Object(have)) => want
            .iter()
            .all(|(k, v)| value_matches(v, have.get(k).unwrap_or(&Value::Null))),
        (Value::Array(want), Value::Array(have)) => {
            if want.iter().chain(have).all(is_scalar) {
                sorted_scalars(want) == sorted_scalars(have)
            } else {
                want.len() == have.len()
                    && want.iter().zip(have).all(|(w, h)| value_matches(w, h))
            }
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => desired == current,
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn sorted_scalars(values: &[Value]) -> Vec<String> {
    let mut out: Vec<String> = values.iter().map(Value::to_string).collect();
    out.sort();
    out
}

/// Comma-separated field names of a change list, for reasons
pub fn describe(changes: &[ConfigChange]) -> String {
    changes
        .iter()
        .map(|c| c.path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ensure, GroupSpec, StorageSpec};
    use serde_json::json;

    fn group(id: &str, comment: Option<&str>, ensure: Ensure) -> GroupSpec {
        GroupSpec {
            groupid: id.into(),
            ensure,
            comment: comment.map(String::from),
        }
    }

    #[test]
    fn test_tri_state() {
        let desired = vec![
            group("ops", Some("operators"), Ensure::Present),
            group("dev", Some("developers"), Ensure::Present),
            group("old", None, Ensure::Absent),
            group("gone", None, Ensure::Absent),
        ];
        let current = vec![
            group("dev", Some("devs"), Ensure::Present),
            group("old", None, Ensure::Present),
        ];

        let diff = diff_keyed(&desired, &current, &[]);
        assert_eq!(diff.creates.len(), 1);
        assert_eq!(diff.creates[0].groupid, "ops");
        assert_eq!(diff.updates.len(), 1);
        assert_eq!(diff.updates[0].2[0].path, "comment");
        assert_eq!(diff.updates[0].2[0].old_value, json!("devs"));
        assert_eq!(diff.deletes.len(), 1);
        assert_eq!(diff.deletes[0].1.groupid, "old");
    }

    #[test]
    fn test_undeclared_fields_are_not_drift() {
        let desired = vec![group("ops", None, Ensure::Present)];
        let current = vec![group("ops", Some("set by hand"), Ensure::Present)];
        assert!(diff_keyed(&desired, &current, &[]).is_empty());
    }

    #[test]
    fn test_duplicates_use_first_entry() {
        let desired = vec![
            group("ops", Some("a"), Ensure::Present),
            group("ops", Some("b"), Ensure::Present),
        ];
        let diff = diff_keyed(&desired, &[], &[]);
        assert_eq!(diff.creates.len(), 1);
        assert_eq!(diff.creates[0].comment.as_deref(), Some("a"));
    }

    #[test]
    fn test_scalar_lists_compare_as_sets() {
        let storage = |content: &[&str]| StorageSpec {
            storage: "local".into(),
            ensure: Ensure::Present,
            storage_type: Some("dir".into()),
            content: Some(content.iter().map(|s| (*s).to_string()).collect()),
            path: None,
            server: None,
            export: None,
            pool: None,
            nodes: None,
            shared: None,
            disable: None,
        };
        let changes = field_changes(&storage(&["iso", "images"]), &storage(&["images", "iso"]), &[]);
        assert!(changes.is_empty());

        let changes = field_changes(&storage(&["iso", "backup"]), &storage(&["images", "iso"]), &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "content");
    }

    #[test]
    fn test_nested_objects_compare_as_subsets() {
        let desired = json!({"title": "Nodes", "panels": [{"id": 1, "type": "graph"}]});
        let current = json!({"title": "Nodes", "version": 7, "panels": [{"id": 1, "type": "graph", "gridPos": {}}]});
        assert!(value_matches(&desired, &current));
        assert!(!value_matches(&json!({"title": "Other"}), &current));
        assert!(value_matches(&json!(2), &json!(2.0)));
    }

    #[test]
    fn test_ignored_fields() {
        let desired = vec![group("ops", Some("x"), Ensure::Present)];
        let current = vec![group("ops", Some("y"), Ensure::Present)];
        assert!(diff_keyed(&desired, &current, &["comment"]).is_empty());
    }
}
