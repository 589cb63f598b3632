//! Rule filters
//!
//! Every filterable field carries a tri-state [`Selector`]:
//!
//! - `Any` matches every rule
//! - `Default` matches only rules that leave the field unset
//! - `Value(v)` matches rules whose field equals `v` (set membership for roles)
//!
//! A `Value` filter may additionally accept unset rule fields through the
//! `include_default` flag. This is how requests are matched: a request for
//! layer `roads` must also hit rules that apply to every layer.

use crate::error::{RuleError, RuleResult};
use crate::model::address::IpRange;
use crate::model::admin_rule::AdminRule;
use crate::model::rule::{Rule, RuleIdentifier};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Token accepted by the heuristic constructors to mean "any value"
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T> {
    Any,
    Default,
    Value(T),
}

/// One field of a rule filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter<T> {
    selector: Selector<T>,
    include_default: bool,
}

pub type TextFilter = FieldFilter<String>;
pub type RoleFilter = FieldFilter<BTreeSet<String>>;
pub type AddressFilter = FieldFilter<AddressValue>;

/// Parsed source address of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressValue {
    Addr(IpAddr),
    /// Input that is not an IP address; never matches a specific range
    Unparsable(String),
}

impl<T> FieldFilter<T> {
    pub fn any() -> Self {
        Self {
            selector: Selector::Any,
            include_default: true,
        }
    }

    pub fn default_only() -> Self {
        Self {
            selector: Selector::Default,
            include_default: true,
        }
    }

    /// Match exactly `value`; unset rule fields do not match
    pub fn exact(value: T) -> Self {
        Self {
            selector: Selector::Value(value),
            include_default: false,
        }
    }

    /// Match `value` or an unset rule field
    pub fn value_or_default(value: T) -> Self {
        Self {
            selector: Selector::Value(value),
            include_default: true,
        }
    }

    pub fn selector(&self) -> &Selector<T> {
        &self.selector
    }

    pub fn include_default(&self) -> bool {
        self.include_default
    }

    pub fn with_include_default(self, include_default: bool) -> Self {
        Self {
            include_default,
            ..self
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self.selector, Selector::Any)
    }

    fn matches_by<F: ?Sized>(&self, field: Option<&F>, eq: impl FnOnce(&T, &F) -> bool) -> bool {
        match (&self.selector, field) {
            (Selector::Any, _) => true,
            (Selector::Default, None) => true,
            (Selector::Default, Some(_)) => false,
            (Selector::Value(_), None) => self.include_default,
            (Selector::Value(value), Some(field)) => eq(value, field),
        }
    }
}

impl<T> Default for FieldFilter<T> {
    fn default() -> Self {
        Self::any()
    }
}

/// Trim raw input and classify it: blank means unset, `*` means any.
fn classify(raw: Option<&str>) -> Selector<&str> {
    match raw.map(str::trim) {
        None | Some("") => Selector::Default,
        Some(WILDCARD) => Selector::Any,
        Some(value) => Selector::Value(value),
    }
}

impl TextFilter {
    /// Build a filter from loosely-typed input
    pub fn heuristic(raw: Option<&str>) -> Self {
        match classify(raw) {
            Selector::Any => Self::any(),
            Selector::Default => Self::default_only(),
            Selector::Value(value) => Self::value_or_default(value.to_string()),
        }
    }

    /// Like [`TextFilter::heuristic`], upper-casing the value
    pub fn heuristic_upper(raw: Option<&str>) -> Self {
        match classify(raw) {
            Selector::Any => Self::any(),
            Selector::Default => Self::default_only(),
            Selector::Value(value) => Self::value_or_default(value.to_uppercase()),
        }
    }

    pub fn matches(&self, field: Option<&str>) -> bool {
        self.matches_by(field, |value, field| value == field)
    }
}

impl RoleFilter {
    /// Build a role filter from a comma separated list
    pub fn heuristic(raw: Option<&str>) -> Self {
        match classify(raw) {
            Selector::Any => Self::any(),
            Selector::Default => Self::default_only(),
            Selector::Value(value) => {
                let roles = value
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect();
                Self::value_or_default(roles)
            }
        }
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::value_or_default(roles.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, field: Option<&str>) -> bool {
        self.matches_by(field, |roles, field| roles.contains(field))
    }
}

impl AddressFilter {
    pub fn heuristic(raw: Option<&str>) -> Self {
        match classify(raw) {
            Selector::Any => Self::any(),
            Selector::Default => Self::default_only(),
            Selector::Value(value) => match value.parse::<IpAddr>() {
                Ok(addr) => Self::value_or_default(AddressValue::Addr(addr)),
                Err(_) => Self::value_or_default(AddressValue::Unparsable(value.to_string())),
            },
        }
    }

    pub fn matches(&self, range: Option<&IpRange>) -> bool {
        self.matches_by(range, |value, range| match value {
            AddressValue::Addr(addr) => range.contains(addr),
            AddressValue::Unparsable(_) => false,
        })
    }

    fn validate(&self) -> RuleResult<()> {
        match &self.selector {
            Selector::Value(AddressValue::Unparsable(raw)) => Err(RuleError::InvalidFilter {
                message: format!("'{}' is not an IP address", raw),
            }),
            _ => Ok(()),
        }
    }
}

/// Filter over data rules; all fields combine with AND
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    pub user: TextFilter,
    pub role: RoleFilter,
    pub service: TextFilter,
    pub request: TextFilter,
    pub subfield: TextFilter,
    pub workspace: TextFilter,
    pub layer: TextFilter,
    pub source_address: AddressFilter,
}

impl RuleFilter {
    /// A filter matching every rule
    pub fn any() -> Self {
        Self::default()
    }

    /// A filter matching rules whose identifier fields are exactly those of `identifier`.
    ///
    /// The address range is left open; callers compare it directly.
    pub fn for_identifier(identifier: &RuleIdentifier) -> Self {
        Self {
            user: exact_text(identifier.username.as_deref()),
            role: match &identifier.rolename {
                Some(role) => RoleFilter::exact(BTreeSet::from([role.clone()])),
                None => RoleFilter::default_only(),
            },
            service: exact_text(identifier.service.as_deref()),
            request: exact_text(identifier.request.as_deref()),
            subfield: exact_text(identifier.subfield.as_deref()),
            workspace: exact_text(identifier.workspace.as_deref()),
            layer: exact_text(identifier.layer.as_deref()),
            source_address: AddressFilter::any(),
        }
    }

    pub fn with_user(self, user: TextFilter) -> Self {
        Self { user, ..self }
    }

    pub fn with_role(self, role: RoleFilter) -> Self {
        Self { role, ..self }
    }

    pub fn with_service(self, service: TextFilter) -> Self {
        Self { service, ..self }
    }

    pub fn with_request(self, request: TextFilter) -> Self {
        Self { request, ..self }
    }

    pub fn with_subfield(self, subfield: TextFilter) -> Self {
        Self { subfield, ..self }
    }

    pub fn with_workspace(self, workspace: TextFilter) -> Self {
        Self { workspace, ..self }
    }

    pub fn with_layer(self, layer: TextFilter) -> Self {
        Self { layer, ..self }
    }

    pub fn with_source_address(self, source_address: AddressFilter) -> Self {
        Self {
            source_address,
            ..self
        }
    }

    pub fn matches(&self, rule: &Rule) -> bool {
        let id = &rule.identifier;
        self.user.matches(id.username.as_deref())
            && self.role.matches(id.rolename.as_deref())
            && self.service.matches(id.service.as_deref())
            && self.request.matches(id.request.as_deref())
            && self.subfield.matches(id.subfield.as_deref())
            && self.workspace.matches(id.workspace.as_deref())
            && self.layer.matches(id.layer.as_deref())
            && self.source_address.matches(id.address_range.as_ref())
    }

    /// Reject selector input that is only tolerated on the resolution path
    pub fn validate(&self) -> RuleResult<()> {
        self.source_address.validate()
    }
}

/// Filter over admin rules; all fields combine with AND
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminRuleFilter {
    pub user: TextFilter,
    pub role: RoleFilter,
    pub workspace: TextFilter,
    pub source_address: AddressFilter,
    pub instance: TextFilter,
}

impl AdminRuleFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: TextFilter) -> Self {
        Self { user, ..self }
    }

    pub fn with_role(self, role: RoleFilter) -> Self {
        Self { role, ..self }
    }

    pub fn with_workspace(self, workspace: TextFilter) -> Self {
        Self { workspace, ..self }
    }

    pub fn with_source_address(self, source_address: AddressFilter) -> Self {
        Self {
            source_address,
            ..self
        }
    }

    pub fn with_instance(self, instance: TextFilter) -> Self {
        Self { instance, ..self }
    }

    pub fn matches(&self, rule: &AdminRule) -> bool {
        let id = &rule.identifier;
        self.user.matches(id.username.as_deref())
            && self.role.matches(id.rolename.as_deref())
            && self.workspace.matches(id.workspace.as_deref())
            && self.source_address.matches(id.address_range.as_ref())
            && self.instance.matches(id.instance.as_deref())
    }

    pub fn validate(&self) -> RuleResult<()> {
        self.source_address.validate()
    }
}

fn exact_text(value: Option<&str>) -> TextFilter {
    match value {
        Some(value) => TextFilter::exact(value.to_string()),
        None => TextFilter::default_only(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_states() {
        assert!(matches!(TextFilter::heuristic(None).selector(), Selector::Default));
        assert!(matches!(TextFilter::heuristic(Some("  ")).selector(), Selector::Default));
        assert!(TextFilter::heuristic(Some("*")).is_any());
        let filter = TextFilter::heuristic(Some("  roads "));
        assert_eq!(filter.selector(), &Selector::Value("roads".to_string()));
        assert!(filter.include_default());
    }

    #[test]
    fn test_heuristic_upper() {
        let filter = TextFilter::heuristic_upper(Some("wms"));
        assert!(filter.matches(Some("WMS")));
        assert!(!filter.matches(Some("wms")));
    }

    #[test]
    fn test_role_heuristic_splits_list() {
        let filter = RoleFilter::heuristic(Some("a, b,,c"));
        assert!(filter.matches(Some("b")));
        assert!(filter.matches(Some("c")));
        assert!(!filter.matches(Some("d")));
        assert!(filter.matches(None));
    }

    #[test]
    fn test_exact_excludes_default() {
        let filter = TextFilter::exact("ws".to_string());
        assert!(filter.matches(Some("ws")));
        assert!(!filter.matches(None));
    }

    #[test]
    fn test_unparsable_address_fails_closed() {
        let filter = AddressFilter::heuristic(Some("not.an.ip"));
        let range: IpRange = "0.0.0.0/0".parse().unwrap();
        assert!(!filter.matches(Some(&range)));
        assert!(filter.matches(None));
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_rule_filter_validate() {
        let filter = RuleFilter::any().with_source_address(AddressFilter::heuristic(Some("bogus")));
        assert!(matches!(
            filter.validate(),
            Err(RuleError::InvalidFilter { .. })
        ));
        assert!(RuleFilter::any().validate().is_ok());
    }
}
