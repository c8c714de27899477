//! Rules for the observability platform
//!
//! Paths are rooted at `/api` (added when missing). Credentials must come from
//! the provider's own configuration, so authorization and cookie headers are
//! dropped from ad hoc calls.

use std::sync::LazyLock;

use super::Method;
use super::rules::{DenyRule, ScopeRules, patterns};

pub(super) static OBSERVABILITY: LazyLock<ScopeRules> = LazyLock::new(|| ScopeRules {
    path_prefix: Some("/api"),
    allow: &[
        "/api/dashboards",
        "/api/folders",
        "/api/datasources",
        "/api/alert-notifications",
        "/api/v1/provisioning",
        "/api/annotations",
        "/api/search",
        "/api/serviceaccounts",
        "/api/teams",
        "/api/org",
        "/api/users",
        "/api/admin",
    ],
    deny: vec![
        DenyRule::new(r"^/api/dashboards/db$", &[Method::Post], "use dashboards"),
        DenyRule::new(
            r"^/api/dashboards/uid/[^/]+$",
            &[Method::Delete],
            "use dashboards",
        ),
    ],
    high_risk: patterns(&[
        r"^/api/admin(/|$)",
        r"^/api/serviceaccounts(/|$)",
        r"^/api/auth/keys(/|$)",
        r"^/api/org(/|$)",
        r"^/api/orgs(/|$)",
        r"^/api/users(/|$)",
        r"^/api/teams(/|$)",
        r"^/api/folders/[^/]+/permissions$",
        r"^/api/datasources(/|$)",
        r"^/api/access-control(/|$)",
    ]),
    dropped_headers: &["authorization", "cookie"],
});

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::model::{Backend, CrudSpec};
    use crate::policy::{PolicyViolation, evaluate};

    fn call(method: &str, path: &str) -> CrudSpec {
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
    fn test_prefixes_api_root() {
        let request = evaluate(Backend::Observability, &call("GET", "search")).unwrap();
        assert_eq!(request.path, "/api/search");
        assert!(!request.high_risk);
    }

    #[test]
    fn test_typed_dashboard_writes_are_reserved() {
        let err = evaluate(Backend::Observability, &call("POST", "/api/dashboards/db")).unwrap_err();
        assert!(matches!(err, PolicyViolation::Reserved { .. }));

        assert!(evaluate(Backend::Observability, &call("GET", "/api/dashboards/uid/abc")).is_ok());
    }

    #[test]
    fn test_service_accounts_need_confirmation() {
        let mut spec = call("create", "/api/serviceaccounts");
        spec.body = Some(json!({"name": "ci"}));
        assert!(matches!(
            evaluate(Backend::Observability, &spec),
            Err(PolicyViolation::ConfirmationRequired { .. })
        ));

        spec.body = Some(json!({"name": "ci", "confirm": "I_UNDERSTAND"}));
        let request = evaluate(Backend::Observability, &spec).unwrap();
        assert_eq!(request.body, Some(json!({"name": "ci"})));
    }

    #[test]
    fn test_drops_credential_headers() {
        let mut spec = call("GET", "/api/folders");
        spec.headers.insert("Authorization".into(), "Bearer abc".into());
        spec.headers.insert("Cookie".into(), "grafana_session=1".into());
        spec.headers.insert("X-Org-Id".into(), "2".into());

        let request = evaluate(Backend::Observability, &spec).unwrap();
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers.get("X-Org-Id").map(String::as_str), Some("2"));
    }
}
