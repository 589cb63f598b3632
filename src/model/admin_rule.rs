//! Administrative rules
//!
//! Admin rules grant workspace-level administrative privileges. They share
//! the priority model of data rules but carry no limits or layer details.

use crate::model::address::IpRange;
use crate::model::rule::RuleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grant carried by an admin rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdminGrantType {
    Admin,
    User,
}

impl AdminGrantType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdminGrantType::Admin => "ADMIN",
            AdminGrantType::User => "USER",
        }
    }
}

impl fmt::Display for AdminGrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminRuleIdentifier {
    pub grant: AdminGrantType,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub rolename: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub address_range: Option<IpRange>,
    #[serde(default)]
    pub instance: Option<String>,
}

impl AdminRuleIdentifier {
    pub fn new(grant: AdminGrantType) -> Self {
        Self {
            grant,
            username: None,
            rolename: None,
            workspace: None,
            address_range: None,
            instance: None,
        }
    }
}

/// A workspace administration rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRule {
    #[serde(default)]
    pub id: Option<RuleId>,
    #[serde(default)]
    pub priority: i64,
    #[serde(flatten)]
    pub identifier: AdminRuleIdentifier,
}

impl AdminRule {
    pub fn new(grant: AdminGrantType) -> Self {
        Self {
            id: None,
            priority: 0,
            identifier: AdminRuleIdentifier::new(grant),
        }
    }

    pub fn admin() -> Self {
        Self::new(AdminGrantType::Admin)
    }

    pub fn user() -> Self {
        Self::new(AdminGrantType::User)
    }

    pub fn grant(&self) -> AdminGrantType {
        self.identifier.grant
    }

    pub fn with_id(self, id: RuleId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    pub fn with_priority(self, priority: i64) -> Self {
        Self { priority, ..self }
    }

    pub fn with_user(mut self, username: impl Into<String>) -> Self {
        self.identifier.username = Some(username.into());
        self
    }

    pub fn with_role(mut self, rolename: impl Into<String>) -> Self {
        self.identifier.rolename = Some(rolename.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.identifier.workspace = Some(workspace.into());
        self
    }

    pub fn with_address_range(mut self, range: IpRange) -> Self {
        self.identifier.address_range = Some(range);
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.identifier.instance = Some(instance.into());
        self
    }
}
