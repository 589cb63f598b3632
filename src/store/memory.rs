//! In-memory rule store
//!
//! Rules live in an arena keyed by generated ids, with a priority index on
//! the side. Every write takes the store's async mutex, and priority
//! allocation runs while the lock is held, so concurrent writers are
//! serialized per store.

use crate::error::{RuleError, RuleResult};
use crate::model::{
    AdminRule, AdminRuleFilter, AdminRuleIdentifier, GrantType, LayerDetails, Rule, RuleFilter,
    RuleId, RuleIdentifier, RuleLimits,
};
use crate::store::priority::{self, InsertPosition, PriorityIndex, offset_priority};
use crate::store::{AdminRuleRepository, Page, PageRequest, Placed, RuleRepository};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Behaviour the in-memory store needs from the values it holds
pub trait StoredRule: Clone + Send + Sync + 'static {
    type Filter: Send + Sync;
    type Identifier: PartialEq + std::fmt::Debug;

    fn id(&self) -> Option<RuleId>;
    fn with_id(self, id: RuleId) -> Self;
    fn priority(&self) -> i64;
    fn with_priority(self, priority: i64) -> Self;
    fn identifier(&self) -> &Self::Identifier;
    fn requires_unique_identifier(&self) -> bool;
    fn matches(&self, filter: &Self::Filter) -> bool;

    /// Merge state the incoming version leaves unset from the stored one
    fn carry_over(self, _stored: &Self) -> Self {
        self
    }
}

impl StoredRule for Rule {
    type Filter = RuleFilter;
    type Identifier = RuleIdentifier;

    fn id(&self) -> Option<RuleId> {
        self.id
    }

    fn with_id(self, id: RuleId) -> Self {
        Rule::with_id(self, id)
    }

    fn priority(&self) -> i64 {
        self.priority
    }

    fn with_priority(self, priority: i64) -> Self {
        Rule::with_priority(self, priority)
    }

    fn identifier(&self) -> &RuleIdentifier {
        &self.identifier
    }

    fn requires_unique_identifier(&self) -> bool {
        Rule::requires_unique_identifier(self)
    }

    fn matches(&self, filter: &RuleFilter) -> bool {
        filter.matches(self)
    }

    fn carry_over(self, stored: &Rule) -> Self {
        self.inherit_attachments(stored)
    }
}

impl StoredRule for AdminRule {
    type Filter = AdminRuleFilter;
    type Identifier = AdminRuleIdentifier;

    fn id(&self) -> Option<RuleId> {
        self.id
    }

    fn with_id(self, id: RuleId) -> Self {
        AdminRule::with_id(self, id)
    }

    fn priority(&self) -> i64 {
        self.priority
    }

    fn with_priority(self, priority: i64) -> Self {
        AdminRule::with_priority(self, priority)
    }

    fn identifier(&self) -> &AdminRuleIdentifier {
        &self.identifier
    }

    fn requires_unique_identifier(&self) -> bool {
        true
    }

    fn matches(&self, filter: &AdminRuleFilter) -> bool {
        filter.matches(self)
    }
}

struct Inner<T> {
    rules: HashMap<RuleId, T>,
    by_priority: BTreeMap<i64, RuleId>,
    next_id: u64,
}

impl<T: StoredRule> Inner<T> {
    fn ordered(&self) -> impl Iterator<Item = &T> {
        self.by_priority.values().filter_map(|id| self.rules.get(id))
    }

    fn insert(&mut self, rule: T, id: RuleId) {
        self.by_priority.insert(rule.priority(), id);
        self.rules.insert(id, rule);
    }

    fn check_identifier(&self, rule: &T) -> RuleResult<()> {
        if !rule.requires_unique_identifier() {
            return Ok(());
        }
        let duplicate = self.rules.values().find(|existing| {
            existing.id() != rule.id()
                && existing.requires_unique_identifier()
                && existing.identifier() == rule.identifier()
        });
        match duplicate {
            Some(existing) => Err(RuleError::conflict(format!(
                "rule {} already has identifier {:?}",
                existing.id().map_or_else(|| "?".to_string(), |id| id.to_string()),
                rule.identifier()
            ))),
            None => Ok(()),
        }
    }
}

impl<T: StoredRule> PriorityIndex for Inner<T> {
    fn min_priority(&self) -> Option<i64> {
        self.by_priority.keys().next().copied()
    }

    fn max_priority(&self) -> Option<i64> {
        self.by_priority.keys().next_back().copied()
    }

    fn is_occupied(&self, priority: i64) -> bool {
        self.by_priority.contains_key(&priority)
    }

    fn nth_ascending(&self, n: usize) -> Option<i64> {
        self.by_priority.keys().nth(n).copied()
    }

    fn nth_descending(&self, n: usize) -> Option<i64> {
        self.by_priority.keys().rev().nth(n).copied()
    }

    fn shift_range(&mut self, from: i64, to: Option<i64>, delta: i64) -> RuleResult<Vec<RuleId>> {
        let upper = to.unwrap_or(i64::MAX);
        if from > upper {
            return Ok(Vec::new());
        }
        // Resolve every target before touching the index
        let moved = self
            .by_priority
            .range(from..=upper)
            .map(|(priority, id)| Ok((*priority, offset_priority(*priority, delta)?, *id)))
            .collect::<RuleResult<Vec<_>>>()?;

        for (priority, _, _) in &moved {
            self.by_priority.remove(priority);
        }
        for (_, shifted, id) in &moved {
            self.by_priority.insert(*shifted, *id);
            if let Some(rule) = self.rules.remove(id) {
                self.rules.insert(*id, rule.with_priority(*shifted));
            }
        }
        Ok(moved.into_iter().map(|(_, _, id)| id).collect())
    }
}

/// Arena-backed store for rules or admin rules
pub struct MemoryStore<T> {
    inner: Mutex<Inner<T>>,
}

pub type MemoryRuleStore = MemoryStore<Rule>;
pub type MemoryAdminRuleStore = MemoryStore<AdminRule>;

impl<T: StoredRule> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                rules: HashMap::new(),
                by_priority: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    async fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().await
    }

    async fn get(&self, id: RuleId) -> Option<T> {
        self.lock().await.rules.get(&id).cloned()
    }

    async fn page(&self, filter: &T::Filter, page: PageRequest) -> Page<T> {
        let inner = self.lock().await;
        let mut matching = inner.ordered().filter(|rule| rule.matches(filter));

        if let Some(cursor) = page.cursor {
            // Advance to the cursor; an unknown cursor yields an empty page
            let mut found = None;
            for rule in matching.by_ref() {
                if rule.id() == Some(cursor) {
                    found = Some(rule);
                    break;
                }
            }
            let Some(first) = found else {
                return Page {
                    items: Vec::new(),
                    next_cursor: None,
                };
            };
            return Self::collect_page(std::iter::once(first).chain(matching), page.limit);
        }

        Self::collect_page(matching, page.limit)
    }

    fn collect_page<'a>(mut rules: impl Iterator<Item = &'a T>, limit: Option<usize>) -> Page<T> {
        let Some(limit) = limit else {
            return Page {
                items: rules.cloned().collect(),
                next_cursor: None,
            };
        };
        let items: Vec<T> = rules.by_ref().take(limit).cloned().collect();
        let next_cursor = rules.next().and_then(StoredRule::id);
        Page { items, next_cursor }
    }

    async fn one_by_priority(&self, priority: i64) -> RuleResult<Option<T>> {
        let inner = self.lock().await;
        let mut holders = inner.rules.values().filter(|r| r.priority() == priority);
        let first = holders.next().cloned();
        let others = holders.count();
        if others > 0 {
            return Err(RuleError::AmbiguousPriority {
                priority,
                count: others + 1,
            });
        }
        Ok(first)
    }

    async fn count_matching(&self, filter: &T::Filter) -> usize {
        self.lock()
            .await
            .rules
            .values()
            .filter(|rule| rule.matches(filter))
            .count()
    }

    async fn insert_new(&self, rule: T, position: InsertPosition) -> RuleResult<Placed<T>> {
        if let Some(id) = rule.id() {
            return Err(RuleError::IdAlreadyAssigned { id });
        }
        if rule.priority() < 0 {
            return Err(RuleError::NegativePriority {
                priority: rule.priority(),
            });
        }

        let mut inner = self.lock().await;
        inner.check_identifier(&rule)?;

        let requested = rule.priority();
        let placement = priority::place_insert(&mut *inner, position, requested)?;
        let id = RuleId::new(inner.next_id);
        inner.next_id += 1;

        let rule = rule.with_id(id).with_priority(placement.priority);
        inner.insert(rule.clone(), id);

        debug!(
            id = %id,
            priority = placement.priority,
            shifted = placement.shifted.len(),
            "Stored new rule"
        );
        Ok(Placed {
            item: rule,
            shifted: placement.shifted,
        })
    }

    async fn replace(&self, rule: T) -> RuleResult<Placed<T>> {
        let id = rule.id().ok_or(RuleError::MissingId)?;
        if rule.priority() < 0 {
            return Err(RuleError::NegativePriority {
                priority: rule.priority(),
            });
        }

        let mut inner = self.lock().await;
        let stored = inner.rules.get(&id).ok_or(RuleError::NotFound { id })?;
        let current = stored.priority();
        let rule = rule.carry_over(stored);
        inner.check_identifier(&rule)?;

        if rule.priority() == current {
            inner.rules.insert(id, rule.clone());
            return Ok(Placed {
                item: rule,
                shifted: Vec::new(),
            });
        }

        inner.by_priority.remove(&current);
        let placement = match priority::place_update(&mut *inner, current, rule.priority()) {
            Ok(placement) => placement,
            Err(e) => {
                inner.by_priority.insert(current, id);
                return Err(e);
            }
        };
        let rule = rule.with_priority(placement.priority);
        inner.insert(rule.clone(), id);

        debug!(
            id = %id,
            from = current,
            to = placement.priority,
            shifted = placement.shifted.len(),
            "Moved rule"
        );
        Ok(Placed {
            item: rule,
            shifted: placement.shifted,
        })
    }

    async fn remove(&self, id: RuleId) -> bool {
        let mut inner = self.lock().await;
        match inner.rules.remove(&id) {
            Some(rule) => {
                inner.by_priority.remove(&rule.priority());
                debug!(id = %id, "Removed rule");
                true
            }
            None => false,
        }
    }

    async fn shift_from(&self, start: i64, offset: i64) -> RuleResult<Option<Vec<RuleId>>> {
        if offset <= 0 {
            return Err(RuleError::InvalidShiftOffset { offset });
        }
        let mut inner = self.lock().await;
        let shifted = inner.shift_range(start, None, offset)?;
        debug!(start, offset, shifted = shifted.len(), "Shifted priorities");
        Ok((!shifted.is_empty()).then_some(shifted))
    }

    async fn swap_priorities(&self, first: RuleId, second: RuleId) -> RuleResult<()> {
        let mut inner = self.lock().await;
        let p1 = inner
            .rules
            .get(&first)
            .map(StoredRule::priority)
            .ok_or(RuleError::NotFound { id: first })?;
        let p2 = inner
            .rules
            .get(&second)
            .map(StoredRule::priority)
            .ok_or(RuleError::NotFound { id: second })?;
        if first == second {
            return Ok(());
        }

        for (id, priority) in [(first, p2), (second, p1)] {
            if let Some(rule) = inner.rules.remove(&id) {
                inner.rules.insert(id, rule.with_priority(priority));
            }
            inner.by_priority.insert(priority, id);
        }
        debug!(first = %first, second = %second, "Swapped priorities");
        Ok(())
    }

    async fn update_with<F>(&self, id: RuleId, f: F) -> RuleResult<()>
    where
        F: FnOnce(T) -> T + Send,
    {
        let mut inner = self.lock().await;
        let rule = inner.rules.remove(&id).ok_or(RuleError::NotFound { id })?;
        inner.rules.insert(id, f(rule));
        Ok(())
    }
}

impl<T: StoredRule> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleRepository for MemoryStore<Rule> {
    async fn find_by_id(&self, id: RuleId) -> RuleResult<Option<Rule>> {
        Ok(self.get(id).await)
    }

    async fn find_all(&self, filter: &RuleFilter, page: PageRequest) -> RuleResult<Page<Rule>> {
        Ok(self.page(filter, page).await)
    }

    async fn find_one_by_priority(&self, priority: i64) -> RuleResult<Option<Rule>> {
        self.one_by_priority(priority).await
    }

    async fn count(&self, filter: &RuleFilter) -> RuleResult<usize> {
        Ok(self.count_matching(filter).await)
    }

    async fn create(&self, rule: Rule, position: InsertPosition) -> RuleResult<Placed<Rule>> {
        self.insert_new(rule, position).await
    }

    async fn save(&self, rule: Rule) -> RuleResult<Placed<Rule>> {
        self.replace(rule).await
    }

    async fn delete_by_id(&self, id: RuleId) -> RuleResult<bool> {
        Ok(self.remove(id).await)
    }

    async fn shift(&self, start: i64, offset: i64) -> RuleResult<Option<Vec<RuleId>>> {
        self.shift_from(start, offset).await
    }

    async fn swap(&self, first: RuleId, second: RuleId) -> RuleResult<()> {
        self.swap_priorities(first, second).await
    }

    async fn set_limits(&self, id: RuleId, limits: Option<RuleLimits>) -> RuleResult<()> {
        let mut inner = self.lock().await;
        let rule = inner.rules.get(&id).ok_or(RuleError::NotFound { id })?;
        if rule.grant() != GrantType::Limit {
            return Err(RuleError::validation(format!(
                "rule {} is {}, limits require a LIMIT rule",
                id,
                rule.grant()
            )));
        }
        if let Some(rule) = inner.rules.remove(&id) {
            inner.rules.insert(id, Rule { limits, ..rule });
        }
        Ok(())
    }

    async fn set_layer_details(
        &self,
        id: RuleId,
        details: Option<LayerDetails>,
    ) -> RuleResult<()> {
        self.update_with(id, |rule| Rule {
            layer_details: details,
            ..rule
        })
        .await
    }

    async fn set_allowed_styles(&self, id: RuleId, styles: BTreeSet<String>) -> RuleResult<()> {
        let mut inner = self.lock().await;
        let rule = inner.rules.get(&id).ok_or(RuleError::NotFound { id })?;
        let Some(details) = rule.layer_details.clone() else {
            return Err(RuleError::validation(format!(
                "rule {} has no layer details",
                id
            )));
        };
        let details = LayerDetails {
            allowed_styles: styles,
            ..details
        };
        if let Some(rule) = inner.rules.remove(&id) {
            inner.rules.insert(id, rule.with_layer_details(details));
        }
        Ok(())
    }

    async fn find_layer_details_by_rule_id(&self, id: RuleId) -> RuleResult<Option<LayerDetails>> {
        let rule = self.get(id).await.ok_or(RuleError::NotFound { id })?;
        Ok(rule.layer_details)
    }
}

#[async_trait]
impl AdminRuleRepository for MemoryStore<AdminRule> {
    async fn find_by_id(&self, id: RuleId) -> RuleResult<Option<AdminRule>> {
        Ok(self.get(id).await)
    }

    async fn find_all(
        &self,
        filter: &AdminRuleFilter,
        page: PageRequest,
    ) -> RuleResult<Page<AdminRule>> {
        Ok(self.page(filter, page).await)
    }

    async fn find_one_by_priority(&self, priority: i64) -> RuleResult<Option<AdminRule>> {
        self.one_by_priority(priority).await
    }

    async fn count(&self, filter: &AdminRuleFilter) -> RuleResult<usize> {
        Ok(self.count_matching(filter).await)
    }

    async fn create(
        &self,
        rule: AdminRule,
        position: InsertPosition,
    ) -> RuleResult<Placed<AdminRule>> {
        self.insert_new(rule, position).await
    }

    async fn save(&self, rule: AdminRule) -> RuleResult<Placed<AdminRule>> {
        self.replace(rule).await
    }

    async fn delete_by_id(&self, id: RuleId) -> RuleResult<bool> {
        Ok(self.remove(id).await)
    }

    async fn shift(&self, start: i64, offset: i64) -> RuleResult<Option<Vec<RuleId>>> {
        self.shift_from(start, offset).await
    }

    async fn swap(&self, first: RuleId, second: RuleId) -> RuleResult<()> {
        self.swap_priorities(first, second).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_ids_and_priorities() {
        let store = MemoryRuleStore::new();
        let a = store
            .create(Rule::allow().with_layer("a"), InsertPosition::Fixed)
            .await
            .unwrap();
        let b = store
            .create(Rule::allow().with_layer("b"), InsertPosition::Fixed)
            .await
            .unwrap();
        assert_eq!(a.item.priority, 1);
        assert_eq!(b.item.priority, 2);
        assert_ne!(a.item.id, b.item.id);
    }

    #[tokio::test]
    async fn test_duplicate_identifier_conflicts() {
        let store = MemoryRuleStore::new();
        store
            .create(Rule::deny().with_layer("a"), InsertPosition::Fixed)
            .await
            .unwrap();
        let err = store
            .create(Rule::deny().with_layer("a"), InsertPosition::Fixed)
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_limit_rules_may_share_identifier() {
        let store = MemoryRuleStore::new();
        for _ in 0..2 {
            store
                .create(Rule::limit().with_layer("a"), InsertPosition::Fixed)
                .await
                .unwrap();
        }
        assert_eq!(store.count(&RuleFilter::any()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pagination_with_cursor() {
        let store = MemoryRuleStore::new();
        for layer in ["a", "b", "c", "d", "e"] {
            store
                .create(Rule::allow().with_layer(layer), InsertPosition::Fixed)
                .await
                .unwrap();
        }

        let first = store
            .find_all(&RuleFilter::any(), PageRequest::first(2))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.unwrap();

        let second = store
            .find_all(&RuleFilter::any(), PageRequest::first(2).after(cursor))
            .await
            .unwrap();
        assert_eq!(second.items[0].identifier.layer.as_deref(), Some("c"));

        let last = store
            .find_all(
                &RuleFilter::any(),
                PageRequest::first(2).after(second.next_cursor.unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.next_cursor, None);
    }

    #[tokio::test]
    async fn test_set_limits_requires_limit_rule() {
        let store = MemoryRuleStore::new();
        let placed = store
            .create(Rule::allow(), InsertPosition::Fixed)
            .await
            .unwrap();
        let err = store
            .set_limits(placed.item.id.unwrap(), Some(RuleLimits::default()))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_shift_nothing_to_shift() {
        let store = MemoryRuleStore::new();
        store.create(Rule::allow(), InsertPosition::Fixed).await.unwrap();
        assert_eq!(store.shift(50, 10).await.unwrap(), None);
        assert!(matches!(
            store.shift(0, 0).await,
            Err(RuleError::InvalidShiftOffset { offset: 0 })
        ));
    }

    #[tokio::test]
    async fn test_admin_store_roundtrip() {
        let store = MemoryAdminRuleStore::new();
        let placed = store
            .create(AdminRule::admin().with_workspace("ws"), InsertPosition::Fixed)
            .await
            .unwrap();
        let found = store.find_one_by_priority(1).await.unwrap().unwrap();
        assert_eq!(found.id, placed.item.id);
        assert!(store.delete_by_id(placed.item.id.unwrap()).await.unwrap());
        assert!(!store.delete_by_id(placed.item.id.unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_overflowing_shift_keeps_store_consistent() {
        let store = MemoryRuleStore::new();
        store
            .create(Rule::allow().with_priority(5), InsertPosition::Fixed)
            .await
            .unwrap();

        assert_eq!(
            store.shift(1, i64::MAX).await,
            Err(RuleError::PriorityOverflow {
                priority: 5,
                delta: i64::MAX
            })
        );

        let page = store.find_all(&RuleFilter::any(), PageRequest::all()).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].priority, 5);
        assert_eq!(store.count(&RuleFilter::any()).await.unwrap(), 1);
        assert!(store.find_one_by_priority(5).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_move_keeps_rule_in_place() {
        let store = MemoryRuleStore::new();
        let a = store
            .create(Rule::allow().with_layer("a").with_priority(1), InsertPosition::Fixed)
            .await
            .unwrap();
        store
            .create(
                Rule::allow().with_layer("b").with_priority(i64::MAX),
                InsertPosition::Fixed,
            )
            .await
            .unwrap();

        let err = store.save(a.item.clone().with_priority(0)).await.unwrap_err();
        assert!(err.is_validation());
        let found = store.find_one_by_priority(1).await.unwrap().unwrap();
        assert_eq!(found.id, a.item.id);
    }

    #[tokio::test]
    async fn test_save_keeps_stored_layer_details() {
        let store = MemoryRuleStore::new();
        let placed = store
            .create(Rule::allow().with_layer("l"), InsertPosition::Fixed)
            .await
            .unwrap();
        let id = placed.item.id.unwrap();
        let details = LayerDetails::default().with_default_style("line");
        store.set_layer_details(id, Some(details.clone())).await.unwrap();

        let saved = store.save(placed.item.with_priority(7)).await.unwrap();
        assert_eq!(saved.item.layer_details, Some(details.clone()));
        assert_eq!(
            store.find_layer_details_by_rule_id(id).await.unwrap(),
            Some(details)
        );

        // Turning the rule into a DENY drops the details
        let deny = Rule {
            layer_details: None,
            ..saved.item
        }
        .with_grant(GrantType::Deny);
        let denied = store.save(deny).await.unwrap();
        assert!(denied.item.layer_details.is_none());
    }
}
