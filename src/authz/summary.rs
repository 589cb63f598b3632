//! Per-workspace access summary
//!
//! Independent of any single request: for a user and a role set, lists per
//! workspace the layers that are granted, the layers that are hidden, and
//! the admin grant that applies.

use crate::error::AuthzResult;
use crate::model::access::bucket_role_filter;
use crate::model::{
    AdminGrantType, AdminRuleFilter, GrantType, Rule, RuleFilter, TextFilter, WILDCARD,
};
use crate::store::{AdminRuleRepository, PageRequest, RuleRepository};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSummaryRequest {
    pub user: Option<String>,
    pub roles: BTreeSet<String>,
}

impl AccessSummaryRequest {
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
}

/// What a user may see in one workspace; `"*"` stands for any layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceAccessSummary {
    pub workspace: String,
    pub admin_access: Option<AdminGrantType>,
    pub allowed: BTreeSet<String>,
    pub forbidden: BTreeSet<String>,
}

impl WorkspaceAccessSummary {
    fn new(workspace: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            admin_access: None,
            allowed: BTreeSet::new(),
            forbidden: BTreeSet::new(),
        }
    }
}

/// Summaries keyed by workspace name; `"*"` stands for any workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSummary {
    pub workspaces: BTreeMap<String, WorkspaceAccessSummary>,
}

impl AccessSummary {
    pub fn workspace(&self, name: &str) -> Option<&WorkspaceAccessSummary> {
        self.workspaces.get(name)
    }

    fn entry(&mut self, workspace: &str) -> &mut WorkspaceAccessSummary {
        self.workspaces
            .entry(workspace.to_string())
            .or_insert_with(|| WorkspaceAccessSummary::new(workspace))
    }
}

fn or_wildcard(value: Option<&str>) -> &str {
    value.unwrap_or(WILDCARD)
}

/// Build the summary for `request` from both rule sets
pub async fn summarize(
    rules: &dyn RuleRepository,
    admin_rules: Option<&dyn AdminRuleRepository>,
    request: &AccessSummaryRequest,
) -> AuthzResult<AccessSummary> {
    let user = TextFilter::heuristic(request.user.as_deref());
    let role = bucket_role_filter(&request.roles);
    let mut summary = AccessSummary::default();

    if let Some(admin_rules) = admin_rules {
        let filter = AdminRuleFilter::any()
            .with_user(user.clone())
            .with_role(role.clone());
        // Ascending priority: the first rule seen per workspace wins
        for rule in admin_rules.find_all(&filter, PageRequest::all()).await?.items {
            let entry = summary.entry(or_wildcard(rule.identifier.workspace.as_deref()));
            if entry.admin_access.is_none() {
                entry.admin_access = Some(rule.grant());
            }
        }
    }

    let filter = RuleFilter::any().with_user(user).with_role(role);
    let mut by_workspace: BTreeMap<String, Vec<Rule>> = BTreeMap::new();
    for rule in rules.find_all(&filter, PageRequest::all()).await?.items {
        by_workspace
            .entry(or_wildcard(rule.identifier.workspace.as_deref()).to_string())
            .or_default()
            .push(rule);
    }

    for (workspace, mut ws_rules) in by_workspace {
        // DENY first so that every ALLOW is applied after it
        ws_rules.retain(|rule| rule.grant() != GrantType::Limit);
        ws_rules.sort_by_key(|rule| (rule.grant() == GrantType::Allow, Reverse(rule.priority)));

        let entry = summary.entry(&workspace);
        for rule in &ws_rules {
            let layer = or_wildcard(rule.identifier.layer.as_deref()).to_string();
            match rule.grant() {
                GrantType::Allow => {
                    entry.forbidden.remove(&layer);
                    entry.allowed.insert(layer);
                }
                GrantType::Deny if rule.identifier.service.is_none() => {
                    entry.forbidden.insert(layer);
                }
                _ => {}
            }
        }
    }

    debug!(
        user = ?request.user,
        workspaces = summary.workspaces.len(),
        "Access summary built"
    );
    Ok(summary)
}
