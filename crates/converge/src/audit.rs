//! Audit trail lines for executed actions
//!
//! One line per executed action:
//!
//! ```text
//! 2026-03-01T12:00:05Z profile=prod kind=create_network target=nodes/pve1/network/vmbr1 success=true message="completed"
//! ```
//!
//! Compensations of a rollback carry `rollback=true`. The executor logs every
//! line under [`AUDIT_TARGET`]; the binary also appends them to a file.

use chrono::SecondsFormat;

use crate::model::{ActionResult, ApplyResult};
use crate::redact::Redactor;

/// `log` target of audit lines
pub const AUDIT_TARGET: &str = "fleetform::audit";

/// Format one audit line; target and message pass through `redactor`
pub fn line(profile: &str, result: &ActionResult, redactor: &Redactor) -> String {
    format!(
        "{} profile={} kind={} target={} success={} message={:?}",
        result.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        profile,
        result.action.kind(),
        redactor.text(&result.action.op.target()),
        result.success,
        redactor.text(&result.message),
    )
}

/// Audit lines of a whole run, rollback included
///
/// Dry runs execute nothing and produce no lines.
pub fn lines(apply: &ApplyResult, redactor: &Redactor) -> Vec<String> {
    if apply.dry_run {
        return Vec::new();
    }

    let forward = apply.results.iter().map(|r| line(&apply.env, r, redactor));
    let rollback = apply
        .rollback
        .iter()
        .flat_map(|rb| rb.results.iter())
        .map(|r| format!("{} rollback=true", line(&apply.env, r, redactor)));
    forward.chain(rollback).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionOp, PlanAction, RollbackReport};
    use chrono::{TimeZone, Utc};

    fn result(op: ActionOp, success: bool, message: &str) -> ActionResult {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 5).unwrap();
        ActionResult {
            action: PlanAction::new(op, "test"),
            success,
            started_at: at,
            finished_at: at,
            message: message.to_string(),
            output: None,
        }
    }

    #[test]
    fn test_line_format() {
        let r = result(
            ActionOp::ReloadNetwork {
                node: "pve1".into(),
            },
            true,
            "completed",
        );
        assert_eq!(
            line("prod", &r, &Redactor::default()),
            "2026-03-01T12:00:05Z profile=prod kind=reload_network target=nodes/pve1/network success=true message=\"completed\""
        );
    }

    #[test]
    fn test_lines_redact_and_mark_rollback() {
        let redactor = Redactor::new(["swordfish"]);
        let apply = ApplyResult {
            generated_at: Utc::now(),
            env: "lab".into(),
            dry_run: false,
            ok: false,
            results: vec![result(
                ActionOp::DeletePool {
                    poolid: "ci".into(),
                },
                false,
                "API error 401: bad ticket swordfish",
            )],
            rollback: Some(RollbackReport {
                attempted: true,
                ok: true,
                results: vec![result(ActionOp::DeleteGroup { groupid: "ops".into() }, true, "completed")],
                message: "Rolled back 1 action(s)".into(),
            }),
        };

        let lines = lines(&apply, &redactor);
        assert_eq!(lines.len(), 2);
        assert!(!lines[0].contains("swordfish"));
        assert!(lines[0].contains("success=false"));
        assert!(lines[1].ends_with("rollback=true"));

        let dry = ApplyResult {
            dry_run: true,
            ..apply
        };
        assert!(super::lines(&dry, &redactor).is_empty());
    }
}
