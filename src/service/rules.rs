//! Data rule administration

use crate::error::{RuleError, RuleResult};
use crate::events::{EventKind, EventSink, RuleEvent, RuleSet};
use crate::model::{GrantType, LayerDetails, Rule, RuleFilter, RuleId, RuleIdentifier, RuleLimits};
use crate::service::{clean, clean_upper};
use crate::store::{InsertPosition, Page, PageRequest, RuleRepository};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Administration entry point for data rules
pub struct RuleService {
    repo: Arc<dyn RuleRepository>,
    events: Arc<dyn EventSink>,
}

impl RuleService {
    pub fn new(repo: Arc<dyn RuleRepository>, events: Arc<dyn EventSink>) -> Self {
        Self { repo, events }
    }

    pub fn repository(&self) -> Arc<dyn RuleRepository> {
        self.repo.clone()
    }

    /// Insert a new rule, resolving its final priority from `position`
    pub async fn insert(&self, rule: Rule, position: InsertPosition) -> RuleResult<Rule> {
        if let Some(id) = rule.id {
            return Err(RuleError::IdAlreadyAssigned { id });
        }
        let rule = sanitize(rule);
        validate(&rule)?;
        self.check_conflict(&rule).await?;

        let placed = self.repo.create(rule, position).await?;
        let id = placed.item.id.ok_or(RuleError::MissingId)?;
        info!(
            id = %id,
            priority = placed.item.priority,
            grant = %placed.item.grant(),
            "Rule created"
        );

        self.events.publish(RuleEvent::new(
            EventKind::Created,
            RuleSet::Rules,
            std::iter::once(id).chain(placed.shifted),
        ));
        Ok(placed.item)
    }

    /// Replace an existing rule, moving it if its priority changed
    pub async fn update(&self, rule: Rule) -> RuleResult<Rule> {
        let id = rule.id.ok_or(RuleError::MissingId)?;
        let rule = sanitize(rule);
        validate(&rule)?;
        self.check_conflict(&rule).await?;

        let placed = self.repo.save(rule).await?;
        info!(id = %id, priority = placed.item.priority, "Rule updated");

        self.events.publish(RuleEvent::new(
            EventKind::Updated,
            RuleSet::Rules,
            std::iter::once(id).chain(placed.shifted),
        ));
        Ok(placed.item)
    }

    /// Delete a rule; returns whether it existed
    pub async fn delete(&self, id: RuleId) -> RuleResult<bool> {
        let deleted = self.repo.delete_by_id(id).await?;
        if deleted {
            info!(id = %id, "Rule deleted");
            self.events
                .publish(RuleEvent::new(EventKind::Deleted, RuleSet::Rules, [id]));
        }
        Ok(deleted)
    }

    pub async fn get(&self, id: RuleId) -> RuleResult<Rule> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(RuleError::NotFound { id })
    }

    pub async fn get_rule_by_priority(&self, priority: i64) -> RuleResult<Option<Rule>> {
        self.repo.find_one_by_priority(priority).await
    }

    pub async fn list(&self, filter: &RuleFilter, page: PageRequest) -> RuleResult<Page<Rule>> {
        filter.validate()?;
        self.repo.find_all(filter, page).await
    }

    pub async fn count(&self, filter: &RuleFilter) -> RuleResult<usize> {
        filter.validate()?;
        self.repo.count(filter).await
    }

    /// Attach or clear the limits of a LIMIT rule
    pub async fn set_limits(&self, id: RuleId, limits: Option<RuleLimits>) -> RuleResult<()> {
        let rule = self.get(id).await?;
        if rule.grant() != GrantType::Limit {
            return Err(RuleError::validation(format!(
                "rule {} is {}; limits can only be set on LIMIT rules",
                id,
                rule.grant()
            )));
        }
        self.repo.set_limits(id, limits).await?;
        self.publish_updated([id]);
        Ok(())
    }

    /// Attach or clear the layer details of an ALLOW rule with a fixed layer
    pub async fn set_layer_details(
        &self,
        id: RuleId,
        details: Option<LayerDetails>,
    ) -> RuleResult<()> {
        let rule = self.get(id).await?;
        check_details_allowed(&rule.identifier, id)?;
        self.repo.set_layer_details(id, details).await?;
        self.publish_updated([id]);
        Ok(())
    }

    /// Replace the allowed styles of a rule's existing layer details
    pub async fn set_allowed_styles(&self, id: RuleId, styles: BTreeSet<String>) -> RuleResult<()> {
        let rule = self.get(id).await?;
        check_details_allowed(&rule.identifier, id)?;
        if rule.layer_details.is_none() {
            return Err(RuleError::validation(format!(
                "rule {} has no layer details",
                id
            )));
        }
        self.repo.set_allowed_styles(id, styles).await?;
        self.publish_updated([id]);
        Ok(())
    }

    pub async fn get_layer_details(&self, id: RuleId) -> RuleResult<Option<LayerDetails>> {
        self.repo.find_layer_details_by_rule_id(id).await
    }

    /// Add `offset` to every priority `>= start`.
    ///
    /// Returns the number of shifted rules, or `None` when nothing was shifted.
    pub async fn shift(&self, start: i64, offset: i64) -> RuleResult<Option<usize>> {
        if offset <= 0 {
            return Err(RuleError::InvalidShiftOffset { offset });
        }
        let shifted = self.repo.shift(start, offset).await?;
        Ok(shifted.map(|ids| {
            let count = ids.len();
            self.publish_updated(ids);
            count
        }))
    }

    pub async fn swap(&self, first: RuleId, second: RuleId) -> RuleResult<()> {
        self.repo.swap(first, second).await?;
        self.publish_updated([first, second]);
        Ok(())
    }

    async fn check_conflict(&self, rule: &Rule) -> RuleResult<()> {
        if !rule.requires_unique_identifier() {
            return Ok(());
        }
        let candidates = self
            .repo
            .find_all(
                &RuleFilter::for_identifier(&rule.identifier),
                PageRequest::all(),
            )
            .await?;
        let existing = candidates.items.iter().find(|other| {
            other.id != rule.id
                && other.requires_unique_identifier()
                && other.identifier == rule.identifier
        });
        if let Some(existing) = existing {
            debug!(existing = ?existing.id, "Identifier conflict");
            return Err(RuleError::conflict(format!(
                "a {} rule with the same identifier already exists at priority {}",
                existing.grant(),
                existing.priority
            )));
        }
        Ok(())
    }

    fn publish_updated(&self, ids: impl IntoIterator<Item = RuleId>) {
        self.events
            .publish(RuleEvent::new(EventKind::Updated, RuleSet::Rules, ids));
    }
}

fn sanitize(rule: Rule) -> Rule {
    let id = rule.identifier;
    Rule {
        identifier: RuleIdentifier {
            grant: id.grant,
            username: clean(id.username),
            rolename: clean(id.rolename),
            service: clean_upper(id.service),
            request: clean_upper(id.request),
            subfield: clean(id.subfield),
            workspace: clean(id.workspace),
            layer: clean(id.layer),
            address_range: id.address_range,
        },
        ..rule
    }
}

fn validate(rule: &Rule) -> RuleResult<()> {
    if rule.priority < 0 {
        return Err(RuleError::NegativePriority {
            priority: rule.priority,
        });
    }
    if rule.limits.is_some() && rule.grant() != GrantType::Limit {
        return Err(RuleError::validation(format!(
            "{} rules cannot carry limits",
            rule.grant()
        )));
    }
    if rule.layer_details.is_some() {
        if rule.grant() != GrantType::Allow {
            return Err(RuleError::validation(format!(
                "{} rules cannot carry layer details",
                rule.grant()
            )));
        }
        if rule.identifier.layer.is_none() {
            return Err(RuleError::validation(
                "layer details require a rule with a fixed layer",
            ));
        }
    }
    Ok(())
}

fn check_details_allowed(identifier: &RuleIdentifier, id: RuleId) -> RuleResult<()> {
    if identifier.grant != GrantType::Allow {
        return Err(RuleError::validation(format!(
            "rule {} is {}; layer details can only be set on ALLOW rules",
            id, identifier.grant
        )));
    }
    if identifier.layer.is_none() {
        return Err(RuleError::validation(format!(
            "rule {} has no fixed layer",
            id
        )));
    }
    Ok(())
}
