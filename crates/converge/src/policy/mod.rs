//! CRUD policy engine for ad hoc path-based API calls
//!
//! The ad hoc CRUD domains let operators issue arbitrary calls against a
//! backend. Every such call passes through [`evaluate`] twice: once during
//! preflight and again right before dispatch. Only the returned
//! [`CrudRequest`] ever reaches a provider.
//!
//! Evaluation steps:
//!
//! 1. Resolve the method (REST verb or CRUD alias) to a canonical [`Method`]
//! 2. Normalize the path to start with `/`; reject `..` and any `?` or `#`
//!    (query parameters go in the `query` map so rules see the bare path)
//! 3. Require the path to sit under the scope's allow-list
//! 4. Reject paths reserved for typed actions (deny rules)
//! 5. Classify high-risk paths; writes to them need the confirmation sentinel
//! 6. Strip the sentinel from the sanitized payload and body

mod observability;
mod rules;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{Backend, CrudSpec};
pub use rules::{DenyRule, ScopeRules};

/// Field carrying the explicit opt-in for high-risk operations
pub const CONFIRM_FIELD: &str = "confirm";

/// Literal value the confirmation field must hold
pub const CONFIRM_SENTINEL: &str = "I_UNDERSTAND";

/// Canonical HTTP verb of an ad hoc call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Parse a REST verb or CRUD alias (case-insensitive)
    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "get" | "read" | "list" | "show" => Some(Self::Get),
            "post" | "create" => Some(Self::Post),
            "put" | "update" | "set" => Some(Self::Put),
            "patch" | "modify" => Some(Self::Patch),
            "delete" | "remove" | "destroy" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn is_write(self) -> bool {
        !matches!(self, Self::Get)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ad hoc call that passed the policy, ready to hand to a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrudRequest {
    pub scope: Backend,
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub high_risk: bool,
}

/// Why an ad hoc call was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("unsupported method '{method}' for {path}")]
    UnsupportedMethod { method: String, path: String },

    #[error("path '{path}' must not contain '..'")]
    PathTraversal { path: String },

    #[error("path '{path}' must not carry a query or fragment; put parameters in `query`")]
    QueryInPath { path: String },

    #[error("{method} {path} is outside the {scope} allow-list")]
    NotAllowed {
        scope: Backend,
        method: Method,
        path: String,
    },

    #[error("{method} {path} is reserved for typed actions ({reason})")]
    Reserved {
        method: Method,
        path: String,
        reason: String,
    },

    #[error("{method} {path} is high-risk: add \"confirm\": \"I_UNDERSTAND\" to the payload or body")]
    ConfirmationRequired { method: Method, path: String },
}

/// Evaluate an ad hoc call against the policy of `scope`
pub fn evaluate(scope: Backend, spec: &CrudSpec) -> Result<CrudRequest, PolicyViolation> {
    let rules = ScopeRules::for_scope(scope);

    let path = normalize_path(&spec.path, rules.path_prefix);
    let method = Method::parse(&spec.method).ok_or_else(|| PolicyViolation::UnsupportedMethod {
        method: spec.method.clone(),
        path: path.clone(),
    })?;

    if path.contains("..") {
        return Err(PolicyViolation::PathTraversal { path });
    }

    if path.contains(['?', '#']) {
        return Err(PolicyViolation::QueryInPath { path });
    }

    if !rules.allows(&path) {
        return Err(PolicyViolation::NotAllowed {
            scope,
            method,
            path,
        });
    }

    if let Some(rule) = rules.denied_by(method, &path) {
        return Err(PolicyViolation::Reserved {
            method,
            path,
            reason: rule.reason.to_string(),
        });
    }

    let high_risk = rules.is_high_risk(&path);
    if high_risk && method.is_write() && !has_confirmation(spec) {
        log::debug!("Rejected unconfirmed high-risk call {method} {path}");
        return Err(PolicyViolation::ConfirmationRequired { method, path });
    }

    let headers = spec
        .headers
        .iter()
        .filter(|(name, _)| {
            !rules
                .dropped_headers
                .iter()
                .any(|dropped| name.eq_ignore_ascii_case(dropped))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(CrudRequest {
        scope,
        method,
        path,
        payload: spec.payload.as_ref().map(strip_confirmation),
        query: spec.query.clone(),
        body: spec.body.as_ref().map(strip_confirmation),
        headers,
        high_risk,
    })
}

/// Whether a JSON object carries the confirmation sentinel
pub fn is_confirmed(value: Option<&Value>) -> bool {
    value
        .and_then(|v| v.get(CONFIRM_FIELD))
        .and_then(Value::as_str)
        .is_some_and(|v| v == CONFIRM_SENTINEL)
}

/// Whether a typed `confirm` field holds the sentinel
pub fn is_confirm_value(confirm: Option<&str>) -> bool {
    confirm == Some(CONFIRM_SENTINEL)
}

fn has_confirmation(spec: &CrudSpec) -> bool {
    is_confirmed(spec.payload.as_ref()) || is_confirmed(spec.body.as_ref())
}

/// Copy of `value` without a sentinel-valued confirmation field
pub fn strip_confirmation(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, v)| {
                    !(k.as_str() == CONFIRM_FIELD && v.as_str() == Some(CONFIRM_SENTINEL))
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn normalize_path(raw: &str, prefix: Option<&str>) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let mut path = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };

    while path.contains("//") {
        path = path.replace("//", "/");
    }

    if let Some(prefix) = prefix
        && path != prefix
        && !path.starts_with(&format!("{prefix}/"))
    {
        path = format!("{prefix}{path}");
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(method: &str, path: &str) -> CrudSpec {
        CrudSpec {
            method: method.into(),
            path: path.into(),
            payload: None,
            query: BTreeMap::new(),
            body: None,
            headers: BTreeMap::new(),
            description: None,
        }
    }

    #[test]
    fn test_method_aliases() {
        assert_eq!(Method::parse("read"), Some(Method::Get));
        assert_eq!(Method::parse("LIST"), Some(Method::Get));
        assert_eq!(Method::parse("create"), Some(Method::Post));
        assert_eq!(Method::parse("update"), Some(Method::Put));
        assert_eq!(Method::parse("patch"), Some(Method::Patch));
        assert_eq!(Method::parse("remove"), Some(Method::Delete));
        assert_eq!(Method::parse("head"), None);
        assert!(!Method::Get.is_write());
        assert!(Method::Delete.is_write());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("nodes/pve1/", None), "/nodes/pve1");
        assert_eq!(normalize_path("//nodes//pve1", None), "/nodes/pve1");
        assert_eq!(normalize_path("dashboards/uid/x", Some("/api")), "/api/dashboards/uid/x");
        assert_eq!(normalize_path("/api/search", Some("/api")), "/api/search");
    }

    #[test]
    fn test_read_is_allowed_and_normalized() {
        let request = evaluate(Backend::Hypervisor, &spec("read", "nodes/pve1/tasks")).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/nodes/pve1/tasks");
        assert!(!request.high_risk);
    }

    #[test]
    fn test_rejects_traversal() {
        let err = evaluate(Backend::Hypervisor, &spec("GET", "/nodes/../access")).unwrap_err();
        assert!(matches!(err, PolicyViolation::PathTraversal { .. }));
    }

    #[test]
    fn test_rejects_query_and_fragment_in_path() {
        for (method, path) in [
            ("POST", "/nodes/pve1/qemu/101/status/stop?x=1"),
            ("POST", "/nodes/pve1/status?command=shutdown"),
            ("PUT", "/access/users/ops@pve#frag"),
            ("GET", "/nodes/pve1/tasks?limit=5"),
        ] {
            let err = evaluate(Backend::Hypervisor, &spec(method, path)).unwrap_err();
            assert!(
                matches!(err, PolicyViolation::QueryInPath { .. }),
                "{method} {path}: {err}"
            );
        }

        let err = evaluate(Backend::Observability, &spec("DELETE", "/api/folders/f1?force=true"))
            .unwrap_err();
        assert!(matches!(err, PolicyViolation::QueryInPath { .. }));

        // The same parameters are accepted through the query map
        let mut call = spec("GET", "/nodes/pve1/tasks");
        call.query.insert("limit".into(), "5".into());
        let request = evaluate(Backend::Hypervisor, &call).unwrap();
        assert_eq!(request.path, "/nodes/pve1/tasks");
        assert_eq!(request.query.get("limit").map(String::as_str), Some("5"));

        // Rules still match the bare path
        let err = evaluate(Backend::Hypervisor, &spec("POST", "/nodes/pve1/status")).unwrap_err();
        assert!(matches!(err, PolicyViolation::ConfirmationRequired { .. }));
    }

    #[test]
    fn test_rejects_outside_allow_list() {
        let err = evaluate(Backend::Hypervisor, &spec("GET", "/api2/json/version")).unwrap_err();
        assert!(matches!(err, PolicyViolation::NotAllowed { .. }));
        assert!(err.to_string().contains("/api2/json/version"));
    }

    #[test]
    fn test_rejects_unknown_method() {
        let err = evaluate(Backend::Hypervisor, &spec("HEAD", "/version")).unwrap_err();
        assert!(matches!(err, PolicyViolation::UnsupportedMethod { .. }));
    }

    #[test]
    fn test_denies_lifecycle_endpoints() {
        let err = evaluate(
            Backend::Hypervisor,
            &spec("POST", "/nodes/pve1/qemu/101/status/stop"),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyViolation::Reserved { .. }));

        // Reading status stays allowed
        assert!(
            evaluate(
                Backend::Hypervisor,
                &spec("GET", "/nodes/pve1/qemu/101/status/current")
            )
            .is_ok()
        );
    }

    #[test]
    fn test_high_risk_write_requires_sentinel() {
        let mut call = spec("POST", "/access/users");
        call.payload = Some(json!({"userid": "ops@pve"}));

        let err = evaluate(Backend::Hypervisor, &call).unwrap_err();
        assert!(matches!(err, PolicyViolation::ConfirmationRequired { .. }));
        assert!(err.to_string().contains("POST /access/users"));

        call.payload = Some(json!({"userid": "ops@pve", "confirm": "I_UNDERSTAND"}));
        let request = evaluate(Backend::Hypervisor, &call).unwrap();
        assert!(request.high_risk);
        assert_eq!(request.payload, Some(json!({"userid": "ops@pve"})));
        let rendered = serde_json::to_string(&request).unwrap();
        assert!(!rendered.contains(CONFIRM_SENTINEL));
    }

    #[test]
    fn test_sentinel_accepted_in_body() {
        let mut call = spec("DELETE", "/users/7");
        call.body = Some(json!({"confirm": "I_UNDERSTAND"}));
        let request = evaluate(Backend::Containers, &call).unwrap();
        assert_eq!(request.body, Some(json!({})));
    }

    #[test]
    fn test_high_risk_read_needs_no_sentinel() {
        let request = evaluate(Backend::Hypervisor, &spec("GET", "/access/users")).unwrap();
        assert!(request.high_risk);
    }

    #[test]
    fn test_wrong_sentinel_value_is_rejected() {
        let mut call = spec("PUT", "/cluster/ha/groups/g1");
        call.payload = Some(json!({"confirm": "yes"}));
        assert!(evaluate(Backend::Hypervisor, &call).is_err());
    }

    #[test]
    fn test_strip_keeps_non_sentinel_confirm() {
        let value = json!({"confirm": "other", "a": 1});
        assert_eq!(strip_confirmation(&value), value);
        assert_eq!(strip_confirmation(&json!([1, 2])), json!([1, 2]));
    }
}
