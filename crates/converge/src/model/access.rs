//! Identity and access entities: users, groups, roles, ACLs, API tokens, pools

use serde::{Deserialize, Serialize};

use super::{Declared, Ensure};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSpec {
    /// `name@realm`
    pub userid: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    /// Expiry as unix timestamp, 0 = never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Declared for UserSpec {
    fn key(&self) -> String {
        self.userid.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub groupid: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Declared for GroupSpec {
    fn key(&self) -> String {
        self.groupid.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub roleid: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// Privilege names, compared as a sorted set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privs: Option<Vec<String>>,
}

impl Declared for RoleSpec {
    fn key(&self) -> String {
        self.roleid.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

/// A role granted to a user, group or token on a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclSpec {
    pub path: String,
    /// User, group (`@group`) or token id
    pub ugid: String,
    pub roleid: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate: Option<bool>,
}

impl Declared for AclSpec {
    fn key(&self) -> String {
        format!("{}|{}|{}", self.path, self.ugid, self.roleid)
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub userid: String,
    pub tokenid: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// Privilege separation: token privileges are a subset of the user's ACLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privsep: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Declared for TokenSpec {
    fn key(&self) -> String {
        format!("{}!{}", self.userid, self.tokenid)
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}

/// Resource pool grouping guests and storages for permission management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub poolid: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vms: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Vec<String>>,
}

impl Declared for PoolSpec {
    fn key(&self) -> String {
        self.poolid.clone()
    }

    fn ensure(&self) -> Ensure {
        self.ensure
    }
}
