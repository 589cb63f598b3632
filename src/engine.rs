//! Wiring of stores, services and resolver
//!
//! [`Engine`] owns one in-memory store per rule set and shares it between
//! the administration services and the resolver.

use crate::authz::AccessResolver;
use crate::config::{AppConfig, StoreConfig};
use crate::error::RuleResult;
use crate::events::EventSink;
use crate::geometry::{GeometryEngine, PlanarEngine};
use crate::model::{AdminRule, Rule};
use crate::service::{AdminRuleService, RuleService};
use crate::store::{InsertPosition, MemoryStore, PageRequest};
use std::sync::Arc;
use tracing::info;

pub struct Engine {
    pub rules: RuleService,
    pub admin_rules: AdminRuleService,
    pub resolver: AccessResolver,
    store: StoreConfig,
}

impl Engine {
    /// Build an engine over empty in-memory stores
    pub fn new(config: &AppConfig, events: Arc<dyn EventSink>) -> Self {
        Self::with_geometry(config, events, Arc::new(PlanarEngine::new()))
    }

    pub fn with_geometry(
        config: &AppConfig,
        events: Arc<dyn EventSink>,
        geometry: Arc<dyn GeometryEngine>,
    ) -> Self {
        let rule_store = Arc::new(MemoryStore::<Rule>::new());
        let admin_store = Arc::new(MemoryStore::<AdminRule>::new());

        let resolver = AccessResolver::new(rule_store.clone(), geometry)
            .with_admin_rules(admin_store.clone())
            .with_admin_rights(config.resolution.admin_rights);

        Self {
            rules: RuleService::new(rule_store, events.clone()),
            admin_rules: AdminRuleService::new(admin_store, events),
            resolver,
            store: config.store.clone(),
        }
    }

    /// Build an engine and insert the configured seed rules in file order
    pub async fn from_config(config: &AppConfig, events: Arc<dyn EventSink>) -> RuleResult<Self> {
        let engine = Self::new(config, events);
        engine.seed(config).await?;
        Ok(engine)
    }

    async fn seed(&self, config: &AppConfig) -> RuleResult<()> {
        for rule in &config.rules {
            self.rules.insert(rule.clone(), InsertPosition::Fixed).await?;
        }
        for rule in &config.admin_rules {
            self.admin_rules
                .insert(rule.clone(), InsertPosition::Fixed)
                .await?;
        }
        info!(
            rules = config.rules.len(),
            admin_rules = config.admin_rules.len(),
            "Seeded rule stores"
        );
        Ok(())
    }

    /// A page request bounded by the store settings
    pub fn page(&self, limit: Option<usize>, cursor: Option<u64>) -> PageRequest {
        let page = PageRequest::first(self.store.page_size(limit));
        match cursor {
            Some(cursor) => page.after(crate::model::RuleId::new(cursor)),
            None => page,
        }
    }
}
