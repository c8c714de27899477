//! Scrubbing of secrets from result messages and outputs
//!
//! Results are persisted and displayed outside the trust boundary of the
//! providers, so every message and output passes through a [`Redactor`]
//! before it is stored or logged.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::model::PlanAction;

/// Replacement for every scrubbed value
pub const REDACTED: &str = "[REDACTED]";

/// `key=value` / `key: value` pairs whose value is a credential
static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(password|passwd|secret|token|api[_-]?key|ticket|csrf[_-]?prevention[_-]?token|private[_-]?key)(["']?\s*[:=]\s*["']?)[^\s"',;&}]+"#,
    )
    .expect("valid key/value redaction regex (verified by tests)")
});

/// Authorization header values, including the scheme
static AUTHORIZATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(authorization["']?\s*[:=]\s*["']?)(bearer |basic )?[^\s"',;]+"#)
        .expect("valid authorization redaction regex (verified by tests)")
});

/// Bare bearer tokens and hypervisor API token / cookie forms
static TOKEN_FORMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bearer |PVEAPIToken=|PVEAuthCookie=)[A-Za-z0-9._~+/=:!@-]+")
        .expect("valid token redaction regex (verified by tests)")
});

/// JSON object keys whose values are always scrubbed
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "cipassword",
    "secret",
    "token",
    "apikey",
    "api_key",
    "authorization",
    "cookie",
    "ticket",
    "privatekey",
    "private_key",
    "csrfpreventiontoken",
];

/// Scrubs configured secrets and well-known credential shapes
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Redactor that also removes every literal in `secrets`
    ///
    /// Empty and very short literals are ignored; they would mangle
    /// unrelated text.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| s.len() >= 4)
            .collect();
        // Longest first so a secret containing another is removed whole
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Self { secrets }
    }

    pub fn text(&self, input: &str) -> String {
        let mut out = input.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }

        let out = AUTHORIZATION.replace_all(&out, format!("${{1}}${{2}}{REDACTED}"));
        let out = TOKEN_FORMS.replace_all(&out, format!("${{1}}{REDACTED}"));
        let out = KEY_VALUE.replace_all(&out, format!("${{1}}${{2}}{REDACTED}"));
        out.into_owned()
    }

    pub fn value(&self, input: &Value) -> Value {
        match input {
            Value::String(s) => Value::String(self.text(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let v = if is_sensitive_key(k) && !v.is_null() {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.value(v)
                        };
                        (k.clone(), v)
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Redactor {
    /// Copy of `action` safe to persist: every string field scrubbed
    ///
    /// Strings are only ever replaced by strings, so the copy still parses
    /// as an action. If a configured literal collides with a fixed
    /// vocabulary string (a kind tag, a method) the copy would no longer
    /// parse; the action is then kept with its reason scrubbed and a warning.
    pub fn action(&self, action: &PlanAction) -> PlanAction {
        let scrubbed = serde_json::to_value(action)
            .map(|v| self.strings(&v))
            .and_then(serde_json::from_value::<PlanAction>);
        match scrubbed {
            Ok(copy) => copy,
            Err(e) => {
                log::warn!("Could not redact {} action fields: {e}", action.kind());
                PlanAction {
                    reason: self.text(&action.reason),
                    ..action.clone()
                }
            }
        }
    }

    fn strings(&self, input: &Value) -> Value {
        match input {
            Value::String(s) => Value::String(self.text(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.strings(v)).collect()),
            Value::Object(map) => {
                // Config changes carry the field name in `path`
                let sensitive_change = map
                    .get("path")
                    .and_then(Value::as_str)
                    .and_then(|p| p.rsplit(['.', '/']).next())
                    .is_some_and(|field| map.contains_key("new_value") && is_sensitive_key(field));
                Value::Object(
                    map.iter()
                        .map(|(k, v)| {
                            let v = match v {
                                Value::String(_) if is_sensitive_key(k) => {
                                    Value::String(REDACTED.to_string())
                                }
                                Value::Null => Value::Null,
                                _ if sensitive_change && k.ends_with("_value") => {
                                    Value::String(REDACTED.to_string())
                                }
                                other => self.strings(other),
                            };
                            (k.clone(), v)
                        })
                        .collect(),
                )
            }
            other => other.clone(),
        }
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase();
    SENSITIVE_KEYS
        .iter()
        .any(|k| normalized == *k || normalized.ends_with(&format!("_{k}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_configured_secret_never_survives() {
        let redactor = Redactor::new(["s3cr3t-value", "ab"]);
        let out = redactor.text("login failed for s3cr3t-value (retry s3cr3t-value)");
        assert!(!out.contains("s3cr3t-value"));
        assert_eq!(out, "login failed for [REDACTED] (retry [REDACTED])");
        assert_eq!(redactor.text("ab cd"), "ab cd");
    }

    #[test]
    fn test_credential_shapes() {
        let redactor = Redactor::default();
        assert_eq!(
            redactor.text("Authorization: Bearer eyJhbGciOi.abc"),
            "Authorization: Bearer [REDACTED]"
        );
        assert_eq!(
            redactor.text("header PVEAPIToken=root@pam!ci=1234-abcd rejected"),
            "header PVEAPIToken=[REDACTED] rejected"
        );
        assert_eq!(
            redactor.text("password=hunter2&user=root"),
            "password=[REDACTED]&user=root"
        );
        assert_eq!(redactor.text(r#"{"token": "abc123"}"#), r#"{"token": "[REDACTED]"}"#);
        assert_eq!(redactor.text("tokens issued: 3"), "tokens issued: 3");
    }

    #[test]
    fn test_json_keys_and_nested_strings() {
        let redactor = Redactor::new(["topsecret"]);
        let value = json!({
            "userid": "ci@pve",
            "value": "abcd-efgh",
            "full_token": {"id": 1},
            "api_key": "k-123",
            "nested": [{"password": "pw", "note": "uses topsecret"}],
            "token": null
        });
        let out = redactor.value(&value);
        assert_eq!(out["userid"], "ci@pve");
        assert_eq!(out["full_token"], "[REDACTED]");
        assert_eq!(out["api_key"], "[REDACTED]");
        assert_eq!(out["nested"][0]["password"], "[REDACTED]");
        assert_eq!(out["nested"][0]["note"], "uses [REDACTED]");
        assert_eq!(out["token"], Value::Null);
        assert!(!out.to_string().contains("topsecret"));
    }

    #[test]
    fn test_action_copy_stays_parseable() {
        let redactor = Redactor::new(["topsecret"]);
        let action: PlanAction = serde_json::from_value(json!({
            "kind": "create_stack",
            "stack": {"name": "web", "endpoint_id": 1, "env": {"DB_PASSWORD": "pw-1", "MODE": "prod"}},
            "reason": "missing, seeded with topsecret"
        }))
        .unwrap();

        let copy = redactor.action(&action);
        assert_eq!(copy.kind(), action.kind());
        assert_eq!(copy.op.target(), action.op.target());
        assert_eq!(copy.reason, "missing, seeded with [REDACTED]");
        let text = serde_json::to_string(&copy).unwrap();
        assert!(text.contains(r#""DB_PASSWORD":"[REDACTED]""#));
        assert!(text.contains(r#""MODE":"prod""#));
        assert!(!text.contains("pw-1"));

        let token: PlanAction = serde_json::from_value(json!({
            "kind": "create_token",
            "token": {"userid": "ci@pve", "tokenid": "deploy"},
            "reason": "missing"
        }))
        .unwrap();
        assert_eq!(redactor.action(&token), token);
    }

    #[test]
    fn test_sensitive_config_change_values() {
        let redactor = Redactor::default();
        let action: PlanAction = serde_json::from_value(json!({
            "kind": "update_vm_config",
            "node": "pve1",
            "vmid": 101,
            "changes": [
                {"path": "cipassword", "old_value": null, "new_value": "pw-1"},
                {"path": "config.api_key", "old_value": 7, "new_value": 8},
                {"path": "memory", "old_value": 2048, "new_value": 4096}
            ],
            "reason": "drift"
        }))
        .unwrap();

        let copy = serde_json::to_value(redactor.action(&action)).unwrap();
        let changes = &copy["changes"];
        assert_eq!(changes[0]["old_value"], Value::Null);
        assert_eq!(changes[0]["new_value"], REDACTED);
        assert_eq!(changes[1]["old_value"], REDACTED);
        assert_eq!(changes[1]["new_value"], REDACTED);
        assert_eq!(changes[2]["new_value"], 4096);
    }
}
