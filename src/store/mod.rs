//! Rule store contract
//!
//! The resolver and the administration services talk to rule storage
//! through [`RuleRepository`] and [`AdminRuleRepository`]. Implementations
//! must keep identifier uniqueness (for non-LIMIT rules) and priority
//! uniqueness, and must run priority allocation inside their own
//! serialization boundary.
//!
//! [`MemoryStore`] is an in-process implementation backed by an arena with
//! per-store generated ids.

pub mod memory;
pub mod priority;

pub use memory::MemoryStore;
pub use priority::{InsertPosition, Placement, PriorityIndex};

use crate::error::RuleResult;
use crate::model::{AdminRule, AdminRuleFilter, LayerDetails, Rule, RuleFilter, RuleId, RuleLimits};
// async_trait required for dyn-compatibility with Arc<dyn RuleRepository>
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Cursor-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest {
    /// Maximum number of items; `None` returns everything after the cursor
    pub limit: Option<usize>,
    /// Id of the first item to return, taken from a previous page
    pub cursor: Option<RuleId>,
}

impl PageRequest {
    /// Every matching item in one page
    pub fn all() -> Self {
        Self::default()
    }

    pub fn first(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            cursor: None,
        }
    }

    pub fn after(self, cursor: RuleId) -> Self {
        Self {
            cursor: Some(cursor),
            ..self
        }
    }
}

/// A page of results in ascending priority order
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page, if there is one
    pub next_cursor: Option<RuleId>,
}

/// A written rule together with every rule moved to make room for it
#[derive(Debug, Clone, PartialEq)]
pub struct Placed<T> {
    pub item: T,
    pub shifted: Vec<RuleId>,
}

/// Storage for data rules
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn find_by_id(&self, id: RuleId) -> RuleResult<Option<Rule>>;

    /// Matching rules in ascending priority order
    async fn find_all(&self, filter: &RuleFilter, page: PageRequest) -> RuleResult<Page<Rule>>;

    /// Fails with [`RuleError::AmbiguousPriority`](crate::error::RuleError) when
    /// more than one rule holds `priority`
    async fn find_one_by_priority(&self, priority: i64) -> RuleResult<Option<Rule>>;

    async fn count(&self, filter: &RuleFilter) -> RuleResult<usize>;

    /// Assign an id and a final priority, then persist
    async fn create(&self, rule: Rule, position: InsertPosition) -> RuleResult<Placed<Rule>>;

    /// Persist changes to an existing rule, moving it if its priority changed
    async fn save(&self, rule: Rule) -> RuleResult<Placed<Rule>>;

    async fn delete_by_id(&self, id: RuleId) -> RuleResult<bool>;

    /// Add `offset` to every priority `>= start`.
    ///
    /// Returns `None` when no rule was shifted.
    async fn shift(&self, start: i64, offset: i64) -> RuleResult<Option<Vec<RuleId>>>;

    async fn swap(&self, first: RuleId, second: RuleId) -> RuleResult<()>;

    async fn set_limits(&self, id: RuleId, limits: Option<RuleLimits>) -> RuleResult<()>;

    async fn set_layer_details(&self, id: RuleId, details: Option<LayerDetails>)
    -> RuleResult<()>;

    async fn set_allowed_styles(&self, id: RuleId, styles: BTreeSet<String>) -> RuleResult<()>;

    async fn find_layer_details_by_rule_id(&self, id: RuleId) -> RuleResult<Option<LayerDetails>>;
}

/// Storage for admin rules
#[async_trait]
pub trait AdminRuleRepository: Send + Sync {
    async fn find_by_id(&self, id: RuleId) -> RuleResult<Option<AdminRule>>;

    async fn find_all(
        &self,
        filter: &AdminRuleFilter,
        page: PageRequest,
    ) -> RuleResult<Page<AdminRule>>;

    async fn find_one_by_priority(&self, priority: i64) -> RuleResult<Option<AdminRule>>;

    async fn count(&self, filter: &AdminRuleFilter) -> RuleResult<usize>;

    async fn create(
        &self,
        rule: AdminRule,
        position: InsertPosition,
    ) -> RuleResult<Placed<AdminRule>>;

    async fn save(&self, rule: AdminRule) -> RuleResult<Placed<AdminRule>>;

    async fn delete_by_id(&self, id: RuleId) -> RuleResult<bool>;

    async fn shift(&self, start: i64, offset: i64) -> RuleResult<Option<Vec<RuleId>>>;

    async fn swap(&self, first: RuleId, second: RuleId) -> RuleResult<()>;
}
