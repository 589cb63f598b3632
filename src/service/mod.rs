//! Administration services
//!
//! Validate, sanitize and persist rules through a repository, publishing a
//! change event for every successful write.

pub mod admin_rules;
pub mod rules;

pub use admin_rules::AdminRuleService;
pub use rules::RuleService;

use crate::model::WILDCARD;

/// Trim free text; blank input and the wildcard token both mean "unset"
fn clean(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == WILDCARD {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn clean_upper(value: Option<String>) -> Option<String> {
    clean(value).map(|v| v.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean(None), None);
        assert_eq!(clean(Some("  ".into())), None);
        assert_eq!(clean(Some("*".into())), None);
        assert_eq!(clean(Some(" ws ".into())), Some("ws".into()));
        assert_eq!(clean_upper(Some("getMap".into())), Some("GETMAP".into()));
    }
}
