//! Access requests and their results
//!
//! These values are request-scoped and never persisted.

use crate::error::{AuthzError, AuthzResult};
use crate::geometry::Geometry;
use crate::model::filter::{AddressFilter, AdminRuleFilter, RoleFilter, RuleFilter, TextFilter, WILDCARD};
use crate::model::rule::{CatalogMode, LayerAttribute, RuleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Final grant of an access decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grant {
    Allow,
    Deny,
}

/// A data access request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessRequest {
    pub user: Option<String>,
    /// Roles the user actually holds
    pub roles: BTreeSet<String>,
    /// Optional narrowing of `roles` chosen by the caller
    pub role_filter: Option<BTreeSet<String>>,
    pub source_address: Option<String>,
    pub service: Option<String>,
    pub request: Option<String>,
    pub subfield: Option<String>,
    pub workspace: Option<String>,
    pub layer: Option<String>,
}

impl AccessRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..self
        }
    }

    pub fn with_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_role_filter<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role_filter: Some(roles.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn with_source_address(self, address: impl Into<String>) -> Self {
        Self {
            source_address: Some(address.into()),
            ..self
        }
    }

    pub fn with_service(self, service: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            ..self
        }
    }

    pub fn with_request(self, request: impl Into<String>) -> Self {
        Self {
            request: Some(request.into()),
            ..self
        }
    }

    pub fn with_subfield(self, subfield: impl Into<String>) -> Self {
        Self {
            subfield: Some(subfield.into()),
            ..self
        }
    }

    pub fn with_workspace(self, workspace: impl Into<String>) -> Self {
        Self {
            workspace: Some(workspace.into()),
            ..self
        }
    }

    pub fn with_layer(self, layer: impl Into<String>) -> Self {
        Self {
            layer: Some(layer.into()),
            ..self
        }
    }

    /// Check the request shape
    pub fn validate(&self) -> AuthzResult<()> {
        validate_identity(self.user.as_deref(), &self.roles, self.role_filter.as_ref())
    }

    /// Roles the request is resolved under: the user's roles, narrowed by the
    /// role filter when one is given. Roles the user does not hold are dropped.
    pub fn effective_roles(&self) -> BTreeSet<String> {
        effective_roles(&self.roles, self.role_filter.as_ref())
    }

    /// Filter over every non-role field of the request
    pub fn rule_filter(&self) -> RuleFilter {
        RuleFilter::any()
            .with_user(TextFilter::heuristic(self.user.as_deref()))
            .with_service(TextFilter::heuristic_upper(self.service.as_deref()))
            .with_request(TextFilter::heuristic_upper(self.request.as_deref()))
            .with_subfield(TextFilter::heuristic(self.subfield.as_deref()))
            .with_workspace(TextFilter::heuristic(self.workspace.as_deref()))
            .with_layer(TextFilter::heuristic(self.layer.as_deref()))
            .with_source_address(AddressFilter::heuristic(self.source_address.as_deref()))
    }

    /// The matching admin request for the same caller and workspace
    pub fn admin_request(&self) -> AdminAccessRequest {
        AdminAccessRequest {
            user: self.user.clone(),
            roles: self.roles.clone(),
            role_filter: self.role_filter.clone(),
            source_address: self.source_address.clone(),
            workspace: self.workspace.clone(),
            instance: None,
        }
    }
}

/// An admin privilege request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminAccessRequest {
    pub user: Option<String>,
    pub roles: BTreeSet<String>,
    pub role_filter: Option<BTreeSet<String>>,
    pub source_address: Option<String>,
    pub workspace: Option<String>,
    pub instance: Option<String>,
}

impl AdminAccessRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..self
        }
    }

    pub fn with_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_role_filter<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role_filter: Some(roles.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn with_source_address(self, address: impl Into<String>) -> Self {
        Self {
            source_address: Some(address.into()),
            ..self
        }
    }

    pub fn with_workspace(self, workspace: impl Into<String>) -> Self {
        Self {
            workspace: Some(workspace.into()),
            ..self
        }
    }

    pub fn with_instance(self, instance: impl Into<String>) -> Self {
        Self {
            instance: Some(instance.into()),
            ..self
        }
    }

    pub fn validate(&self) -> AuthzResult<()> {
        validate_identity(self.user.as_deref(), &self.roles, self.role_filter.as_ref())
    }

    pub fn effective_roles(&self) -> BTreeSet<String> {
        effective_roles(&self.roles, self.role_filter.as_ref())
    }

    pub fn rule_filter(&self) -> AdminRuleFilter {
        AdminRuleFilter::any()
            .with_user(TextFilter::heuristic(self.user.as_deref()))
            .with_workspace(TextFilter::heuristic(self.workspace.as_deref()))
            .with_source_address(AddressFilter::heuristic(self.source_address.as_deref()))
            .with_instance(TextFilter::heuristic(self.instance.as_deref()))
    }
}

fn validate_identity(
    user: Option<&str>,
    roles: &BTreeSet<String>,
    role_filter: Option<&BTreeSet<String>>,
) -> AuthzResult<()> {
    if let Some(user) = user
        && (user.trim().is_empty() || user.trim() == WILDCARD)
    {
        return Err(AuthzError::invalid_request(format!(
            "'{}' is not a valid user name",
            user
        )));
    }

    for role in roles.iter().chain(role_filter.into_iter().flatten()) {
        if role.trim().is_empty() || role.trim() == WILDCARD {
            return Err(AuthzError::invalid_request(format!(
                "'{}' is not a valid role name",
                role
            )));
        }
    }

    Ok(())
}

fn effective_roles(
    roles: &BTreeSet<String>,
    role_filter: Option<&BTreeSet<String>>,
) -> BTreeSet<String> {
    match role_filter {
        Some(selected) => roles.intersection(selected).cloned().collect(),
        None => roles.clone(),
    }
}

/// Role filter for a set of effective roles: the default bucket only when
/// there are none.
pub(crate) fn bucket_role_filter(roles: &BTreeSet<String>) -> RoleFilter {
    if roles.is_empty() {
        RoleFilter::default_only()
    } else {
        RoleFilter::value_or_default(roles.clone())
    }
}

/// Combined outcome of a data access request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessInfo {
    pub grant: Grant,
    pub cql_filter_read: Option<String>,
    pub cql_filter_write: Option<String>,
    pub catalog_mode: Option<CatalogMode>,
    /// Features must intersect this area
    pub area: Option<Geometry>,
    /// Features are clipped to this area
    pub clip_area: Option<Geometry>,
    pub default_style: Option<String>,
    /// Empty means unrestricted
    pub allowed_styles: BTreeSet<String>,
    /// Empty means unrestricted
    pub attributes: Vec<LayerAttribute>,
    pub admin_rights: bool,
    /// Every rule examined while matching, in priority order
    pub matching_rules: Vec<RuleId>,
}

impl AccessInfo {
    /// The fail-closed result
    pub fn deny_all() -> Self {
        Self {
            grant: Grant::Deny,
            cql_filter_read: None,
            cql_filter_write: None,
            catalog_mode: None,
            area: None,
            clip_area: None,
            default_style: None,
            allowed_styles: BTreeSet::new(),
            attributes: Vec::new(),
            admin_rights: false,
            matching_rules: Vec::new(),
        }
    }

    /// An unrestricted ALLOW
    pub fn allow_all() -> Self {
        Self {
            grant: Grant::Allow,
            ..Self::deny_all()
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.grant == Grant::Allow
    }

    pub fn with_matching_rules(self, matching_rules: Vec<RuleId>) -> Self {
        Self {
            matching_rules,
            ..self
        }
    }

    pub fn with_admin_rights(self, admin_rights: bool) -> Self {
        Self {
            admin_rights,
            ..self
        }
    }

    /// Access level of a named attribute, if the result restricts attributes
    pub fn attribute(&self, name: &str) -> Option<&LayerAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Outcome of an admin privilege request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAccessInfo {
    pub admin: bool,
    pub workspace: Option<String>,
    /// The deciding admin rule of each bucket
    pub matching_rules: Vec<RuleId>,
}
