//! Application-layer entities: container stacks, observability objects, ad hoc calls

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Declared, Ensure};

/// A compose stack deployed through the container runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSpec {
    pub name: String,
    pub endpoint_id: u64,
    /// Server-assigned id; required to delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Bumping the revision forces a redeploy of an unchanged stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Declared for StackSpec {
    fn key(&self) -> String {
        format!("{}@{}", self.name, self.endpoint_id)
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

/// A dashboard folder; matched by uid when given, otherwise by title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub ensure: Ensure,
}

impl Declared for FolderSpec {
    fn key(&self) -> String {
        self.uid.clone().unwrap_or_else(|| self.title.clone())
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub ensure: Ensure,
    /// Plugin id, e.g. `prometheus`, `loki`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ds_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_data: Option<Value>,
}

impl Declared for DatasourceSpec {
    fn key(&self) -> String {
        self.name.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

/// A dashboard; matched by uid when given, otherwise by title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,
    /// Dashboard JSON model (panels, templating, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Value>,
}

impl Declared for DashboardSpec {
    fn key(&self) -> String {
        self.uid.clone().unwrap_or_else(|| self.title.clone())
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

/// A raw path-based API call, gated by the CRUD policy engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrudSpec {
    /// REST verb or CRUD alias (`create`, `read`, `update`, `delete`, ...)
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
