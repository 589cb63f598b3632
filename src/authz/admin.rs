//! Admin authorization resolver

use crate::authz::bucketize;
use crate::error::AuthzResult;
use crate::model::access::bucket_role_filter;
use crate::model::{AdminAccessInfo, AdminAccessRequest, AdminGrantType};
use crate::store::{AdminRuleRepository, PageRequest};
use tracing::debug;

/// Decide whether a request carries admin rights on its workspace.
///
/// In each role bucket the first admin rule by priority decides; buckets
/// combine by OR.
pub async fn resolve_admin_access(
    repo: &dyn AdminRuleRepository,
    request: &AdminAccessRequest,
) -> AuthzResult<AdminAccessInfo> {
    request.validate()?;
    let roles = request.effective_roles();
    let filter = request.rule_filter().with_role(bucket_role_filter(&roles));
    let candidates = repo.find_all(&filter, PageRequest::all()).await?.items;

    let buckets = bucketize(&candidates, &roles, |r| r.identifier.rolename.as_deref());

    let mut admin = false;
    let mut matching_rules = Vec::new();
    for (role, rules) in &buckets {
        let Some(first) = rules.first() else {
            continue;
        };
        let granted = first.grant() == AdminGrantType::Admin;
        debug!(role = ?role, rule = ?first.id, granted, "Admin bucket resolved");
        admin |= granted;
        if let Some(id) = first.id
            && !matching_rules.contains(&id)
        {
            matching_rules.push(id);
        }
    }

    Ok(AdminAccessInfo {
        admin,
        workspace: request.workspace.clone(),
        matching_rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AdminRule;
    use crate::store::{InsertPosition, MemoryStore};

    async fn store(rules: Vec<AdminRule>) -> MemoryStore<AdminRule> {
        let store = MemoryStore::new();
        for rule in rules {
            store.create(rule, InsertPosition::Fixed).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_first_rule_decides_bucket() {
        let store = store(vec![
            AdminRule::user().with_priority(1).with_role("r").with_workspace("ws"),
            AdminRule::admin().with_priority(2).with_role("r"),
        ])
        .await;
        let request = AdminAccessRequest::new()
            .with_user("u")
            .with_roles(["r"])
            .with_workspace("ws");
        let info = resolve_admin_access(&store, &request).await.unwrap();
        assert!(!info.admin);
        assert_eq!(info.matching_rules.len(), 1);
    }

    #[tokio::test]
    async fn test_buckets_combine_by_or() {
        let store = store(vec![
            AdminRule::user().with_priority(1).with_role("a"),
            AdminRule::admin().with_priority(2).with_role("b"),
        ])
        .await;
        let request = AdminAccessRequest::new().with_user("u").with_roles(["a", "b"]);
        let info = resolve_admin_access(&store, &request).await.unwrap();
        assert!(info.admin);
    }

    #[tokio::test]
    async fn test_no_rules_means_no_rights() {
        let store = store(vec![]).await;
        let info = resolve_admin_access(&store, &AdminAccessRequest::new())
            .await
            .unwrap();
        assert!(!info.admin);
        assert!(info.matching_rules.is_empty());
    }
}
