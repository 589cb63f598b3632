//! Authorization engine
//!
//! Resolves data access requests against the rule set, admin requests
//! against the admin rule set, and builds per-workspace access summaries.
//! Every resolution reads a snapshot from the store and holds no state of
//! its own.

pub mod admin;
pub mod merge;
pub mod resolver;
pub mod summary;

pub use admin::resolve_admin_access;
pub use resolver::AccessResolver;
pub use summary::{AccessSummary, AccessSummaryRequest, WorkspaceAccessSummary};

use std::collections::{BTreeMap, BTreeSet};

/// Split candidate rules into per-role buckets.
///
/// With no roles there is a single bucket (keyed `None`) holding the rules
/// that name no role. Otherwise every role gets a bucket holding its own
/// rules plus every rule that names no role. Candidates must already be in
/// ascending priority order; bucket order is role-name order.
pub(crate) fn bucketize<T: Clone>(
    candidates: &[T],
    roles: &BTreeSet<String>,
    rolename: impl Fn(&T) -> Option<&str>,
) -> BTreeMap<Option<String>, Vec<T>> {
    let mut buckets = BTreeMap::new();

    if roles.is_empty() {
        let rules = candidates
            .iter()
            .filter(|rule| rolename(*rule).is_none())
            .cloned()
            .collect();
        buckets.insert(None, rules);
        return buckets;
    }

    for role in roles {
        let rules = candidates
            .iter()
            .filter(|rule| rolename(*rule).is_none_or(|r| r == role.as_str()))
            .cloned()
            .collect();
        buckets.insert(Some(role.clone()), rules);
    }
    buckets
}
