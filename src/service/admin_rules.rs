//! Admin rule administration

use crate::error::{RuleError, RuleResult};
use crate::events::{EventKind, EventSink, RuleEvent, RuleSet};
use crate::model::{AdminRule, AdminRuleFilter, AdminRuleIdentifier, RuleId};
use crate::service::clean;
use crate::store::{AdminRuleRepository, InsertPosition, Page, PageRequest};
use std::sync::Arc;
use tracing::info;

pub struct AdminRuleService {
    repo: Arc<dyn AdminRuleRepository>,
    events: Arc<dyn EventSink>,
}

impl AdminRuleService {
    pub fn new(repo: Arc<dyn AdminRuleRepository>, events: Arc<dyn EventSink>) -> Self {
        Self { repo, events }
    }

    pub fn repository(&self) -> Arc<dyn AdminRuleRepository> {
        self.repo.clone()
    }

    pub async fn insert(&self, rule: AdminRule, position: InsertPosition) -> RuleResult<AdminRule> {
        if let Some(id) = rule.id {
            return Err(RuleError::IdAlreadyAssigned { id });
        }
        let rule = sanitize(rule);
        check_priority(&rule)?;
        self.check_conflict(&rule).await?;

        let placed = self.repo.create(rule, position).await?;
        let id = placed.item.id.ok_or(RuleError::MissingId)?;
        info!(
            id = %id,
            priority = placed.item.priority,
            grant = %placed.item.grant(),
            "Admin rule created"
        );
        self.publish(EventKind::Created, std::iter::once(id).chain(placed.shifted));
        Ok(placed.item)
    }

    pub async fn update(&self, rule: AdminRule) -> RuleResult<AdminRule> {
        let id = rule.id.ok_or(RuleError::MissingId)?;
        let rule = sanitize(rule);
        check_priority(&rule)?;
        self.check_conflict(&rule).await?;

        let placed = self.repo.save(rule).await?;
        info!(id = %id, priority = placed.item.priority, "Admin rule updated");
        self.publish(EventKind::Updated, std::iter::once(id).chain(placed.shifted));
        Ok(placed.item)
    }

    pub async fn delete(&self, id: RuleId) -> RuleResult<bool> {
        let deleted = self.repo.delete_by_id(id).await?;
        if deleted {
            info!(id = %id, "Admin rule deleted");
            self.publish(EventKind::Deleted, [id]);
        }
        Ok(deleted)
    }

    pub async fn get(&self, id: RuleId) -> RuleResult<AdminRule> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(RuleError::NotFound { id })
    }

    pub async fn get_rule_by_priority(&self, priority: i64) -> RuleResult<Option<AdminRule>> {
        self.repo.find_one_by_priority(priority).await
    }

    pub async fn list(
        &self,
        filter: &AdminRuleFilter,
        page: PageRequest,
    ) -> RuleResult<Page<AdminRule>> {
        filter.validate()?;
        self.repo.find_all(filter, page).await
    }

    pub async fn count(&self, filter: &AdminRuleFilter) -> RuleResult<usize> {
        filter.validate()?;
        self.repo.count(filter).await
    }

    pub async fn shift(&self, start: i64, offset: i64) -> RuleResult<Option<usize>> {
        if offset <= 0 {
            return Err(RuleError::InvalidShiftOffset { offset });
        }
        let shifted = self.repo.shift(start, offset).await?;
        Ok(shifted.map(|ids| {
            let count = ids.len();
            self.publish(EventKind::Updated, ids);
            count
        }))
    }

    pub async fn swap(&self, first: RuleId, second: RuleId) -> RuleResult<()> {
        self.repo.swap(first, second).await?;
        self.publish(EventKind::Updated, [first, second]);
        Ok(())
    }

    async fn check_conflict(&self, rule: &AdminRule) -> RuleResult<()> {
        let all = self.repo.find_all(&AdminRuleFilter::any(), PageRequest::all()).await?;
        if let Some(existing) = all
            .items
            .iter()
            .find(|other| other.id != rule.id && other.identifier == rule.identifier)
        {
            return Err(RuleError::conflict(format!(
                "an admin rule with the same identifier already exists at priority {}",
                existing.priority
            )));
        }
        Ok(())
    }

    fn publish(&self, kind: EventKind, ids: impl IntoIterator<Item = RuleId>) {
        self.events
            .publish(RuleEvent::new(kind, RuleSet::AdminRules, ids));
    }
}

fn sanitize(rule: AdminRule) -> AdminRule {
    let id = rule.identifier;
    AdminRule {
        identifier: AdminRuleIdentifier {
            grant: id.grant,
            username: clean(id.username),
            rolename: clean(id.rolename),
            workspace: clean(id.workspace),
            address_range: id.address_range,
            instance: clean(id.instance),
        },
        ..rule
    }
}

fn check_priority(rule: &AdminRule) -> RuleResult<()> {
    if rule.priority < 0 {
        return Err(RuleError::NegativePriority {
            priority: rule.priority,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastEventSink;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_insert_and_delete_publish_events() {
        let (sink, mut rx) = BroadcastEventSink::new(8);
        let service = AdminRuleService::new(Arc::new(MemoryStore::<AdminRule>::new()), Arc::new(sink));

        let rule = service
            .insert(AdminRule::admin().with_workspace(" ws "), InsertPosition::Fixed)
            .await
            .unwrap();
        assert_eq!(rule.identifier.workspace.as_deref(), Some("ws"));
        let created = rx.try_recv().unwrap();
        assert_eq!(created.kind, EventKind::Created);
        assert_eq!(created.rule_set, RuleSet::AdminRules);

        let id = rule.id.unwrap();
        assert!(service.delete(id).await.unwrap());
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::Deleted);

        assert!(!service.delete(id).await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_identifier_rejected() {
        let (sink, _rx) = BroadcastEventSink::new(8);
        let service = AdminRuleService::new(Arc::new(MemoryStore::<AdminRule>::new()), Arc::new(sink));
        service
            .insert(AdminRule::user().with_user("u"), InsertPosition::Fixed)
            .await
            .unwrap();
        let err = service
            .insert(AdminRule::user().with_user("u"), InsertPosition::Fixed)
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::Conflict { .. }));
    }
}
