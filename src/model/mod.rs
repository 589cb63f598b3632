//! Domain model
//!
//! Rules, admin rules, filters and the request/response values of the
//! authorization engine. All values are immutable; `with_*` methods return
//! a modified copy.

pub mod access;
pub mod address;
pub mod admin_rule;
pub mod filter;
pub mod rule;

pub use access::{AccessInfo, AccessRequest, AdminAccessInfo, AdminAccessRequest, Grant};
pub use address::IpRange;
pub use admin_rule::{AdminGrantType, AdminRule, AdminRuleIdentifier};
pub use filter::{
    AddressFilter, AdminRuleFilter, FieldFilter, RoleFilter, RuleFilter, Selector, TextFilter,
    WILDCARD,
};
pub use rule::{
    AccessType, CatalogMode, GrantType, LayerAttribute, LayerDetails, LayerType, Rule,
    RuleIdentifier, RuleId, RuleLimits, SpatialFilterType,
};
