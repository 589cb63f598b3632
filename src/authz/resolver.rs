//! Data access resolution
//!
//! A request is resolved in three steps:
//!
//! 1. Fetch every candidate rule once and split it into role buckets
//! 2. Resolve each bucket on its own: LIMIT rules accumulate until the first
//!    ALLOW or DENY decides the bucket
//! 3. Enlarge the bucket results into one grant, in role-name order
//!
//! Anything left undecided resolves to [`AccessInfo::deny_all`].

use crate::authz::admin::resolve_admin_access;
use crate::authz::bucketize;
use crate::authz::merge::{enlarge, stricter};
use crate::authz::summary::{AccessSummary, AccessSummaryRequest, summarize};
use crate::error::AuthzResult;
use crate::geometry::{Geometry, GeometryEngine, intersect_optional};
use crate::model::access::bucket_role_filter;
use crate::model::{
    AccessInfo, AccessRequest, AdminAccessInfo, AdminAccessRequest, CatalogMode, GrantType, Rule,
    RuleId, SpatialFilterType,
};
use crate::store::{AdminRuleRepository, PageRequest, RuleRepository};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolves access requests against a rule store
pub struct AccessResolver {
    rules: Arc<dyn RuleRepository>,
    admin_rules: Option<Arc<dyn AdminRuleRepository>>,
    geometry: Arc<dyn GeometryEngine>,
    admin_rights: bool,
}

impl AccessResolver {
    pub fn new(rules: Arc<dyn RuleRepository>, geometry: Arc<dyn GeometryEngine>) -> Self {
        Self {
            rules,
            admin_rules: None,
            geometry,
            admin_rights: true,
        }
    }

    /// Attach an admin rule store, enabling admin queries and admin rights
    pub fn with_admin_rules(self, admin_rules: Arc<dyn AdminRuleRepository>) -> Self {
        Self {
            admin_rules: Some(admin_rules),
            ..self
        }
    }

    /// Whether ALLOW results carry admin rights for the requested workspace
    pub fn with_admin_rights(self, admin_rights: bool) -> Self {
        Self {
            admin_rights,
            ..self
        }
    }

    /// Resolve a data access request
    pub async fn get_access_info(&self, request: &AccessRequest) -> AuthzResult<AccessInfo> {
        request.validate()?;
        let roles = request.effective_roles();
        let candidates = self.candidates(request, &roles).await?;
        let buckets = bucketize(&candidates, &roles, |r| r.identifier.rolename.as_deref());

        let mut combined: Option<AccessInfo> = None;
        let mut examined: Vec<&Rule> = Vec::new();
        for (role, rules) in &buckets {
            let resolved = self.resolve_ruleset(rules).await?;
            debug!(
                role = ?role,
                rules = rules.len(),
                grant = ?resolved.as_ref().map(|info| info.grant),
                "Bucket resolved"
            );
            combined = enlarge(self.geometry.as_ref(), combined, resolved)?;
            examined.extend(rules.iter());
        }

        let info = combined
            .unwrap_or_else(AccessInfo::deny_all)
            .with_matching_rules(ordered_ids(examined));
        let info = self.attach_admin_rights(request, info).await?;

        debug!(
            user = ?request.user,
            layer = ?request.layer,
            grant = ?info.grant,
            matching = info.matching_rules.len(),
            "Access resolved"
        );
        Ok(info)
    }

    /// Every rule that takes part in resolving `request`, in priority order
    pub async fn get_matching_rules(&self, request: &AccessRequest) -> AuthzResult<Vec<Rule>> {
        request.validate()?;
        let roles = request.effective_roles();
        let candidates = self.candidates(request, &roles).await?;
        let buckets = bucketize(&candidates, &roles, |r| r.identifier.rolename.as_deref());

        let mut seen = BTreeSet::new();
        let mut rules: Vec<Rule> = buckets
            .into_values()
            .flatten()
            .filter(|rule| rule.id.is_none_or(|id| seen.insert(id)))
            .collect();
        rules.sort_by_key(|rule| rule.priority);
        Ok(rules)
    }

    /// Resolve an admin request; without an admin store nobody is an admin
    pub async fn get_admin_access_info(
        &self,
        request: &AdminAccessRequest,
    ) -> AuthzResult<AdminAccessInfo> {
        match &self.admin_rules {
            Some(repo) => resolve_admin_access(repo.as_ref(), request).await,
            None => {
                request.validate()?;
                Ok(AdminAccessInfo {
                    admin: false,
                    workspace: request.workspace.clone(),
                    matching_rules: Vec::new(),
                })
            }
        }
    }

    /// Per-workspace summary of what a user may see
    pub async fn get_access_summary(
        &self,
        request: &AccessSummaryRequest,
    ) -> AuthzResult<AccessSummary> {
        summarize(
            self.rules.as_ref(),
            self.admin_rules.as_deref(),
            request,
        )
        .await
    }

    async fn candidates(
        &self,
        request: &AccessRequest,
        roles: &BTreeSet<String>,
    ) -> AuthzResult<Vec<Rule>> {
        let filter = request.rule_filter().with_role(bucket_role_filter(roles));
        let page = self.rules.find_all(&filter, PageRequest::all()).await?;
        trace!(candidates = page.items.len(), "Fetched candidate rules");
        Ok(page.items)
    }

    /// Resolve one bucket; `None` when no ALLOW or DENY rule decides it
    async fn resolve_ruleset(&self, rules: &[Rule]) -> AuthzResult<Option<AccessInfo>> {
        let mut limits: Vec<&Rule> = Vec::new();
        for rule in rules {
            match rule.grant() {
                GrantType::Limit => limits.push(rule),
                GrantType::Deny => return Ok(Some(AccessInfo::deny_all())),
                GrantType::Allow => return self.build_allow(rule, &limits).await.map(Some),
            }
        }
        Ok(None)
    }

    async fn build_allow(&self, rule: &Rule, limits: &[&Rule]) -> AuthzResult<AccessInfo> {
        let engine = self.geometry.as_ref();
        let mut area: Option<Geometry> = None;
        let mut catalog_mode: Option<CatalogMode> = None;
        let mut clip = false;

        for limit in limits.iter().filter_map(|r| r.limits.as_ref()) {
            area = intersect_optional(engine, area, limit.allowed_area.as_ref())?;
            catalog_mode = stricter(catalog_mode, Some(limit.catalog_mode));
            clip |= limit.spatial_filter_type == SpatialFilterType::Clip;
        }

        let mut info = AccessInfo::allow_all();

        if rule.identifier.layer.is_some() {
            let details = match rule.id {
                Some(id) => self.rules.find_layer_details_by_rule_id(id).await?,
                None => rule.layer_details.clone(),
            };
            if let Some(details) = details {
                area = intersect_optional(engine, area, details.area.as_ref())?;
                catalog_mode = stricter(catalog_mode, details.catalog_mode);
                clip |= details.spatial_filter_type == Some(SpatialFilterType::Clip);

                info.cql_filter_read = details.cql_filter_read;
                info.cql_filter_write = details.cql_filter_write;
                info.default_style = details.default_style;
                info.allowed_styles = details.allowed_styles;
                info.attributes = details.attributes;
            }
        }

        info.catalog_mode = catalog_mode;
        if clip {
            info.clip_area = area;
        } else {
            info.area = area;
        }
        Ok(info)
    }

    async fn attach_admin_rights(
        &self,
        request: &AccessRequest,
        info: AccessInfo,
    ) -> AuthzResult<AccessInfo> {
        if !self.admin_rights || !info.is_allowed() || request.workspace.is_none() {
            return Ok(info);
        }
        let Some(repo) = &self.admin_rules else {
            return Ok(info);
        };
        let admin = resolve_admin_access(repo.as_ref(), &request.admin_request()).await?;
        Ok(info.with_admin_rights(admin.admin))
    }
}

/// Ids of the examined rules, by priority, without duplicates
fn ordered_ids(mut rules: Vec<&Rule>) -> Vec<RuleId> {
    rules.sort_by_key(|rule| rule.priority);
    let mut seen = BTreeSet::new();
    rules
        .into_iter()
        .filter_map(|rule| rule.id)
        .filter(|id| seen.insert(*id))
        .collect()
}
