//! Tenant rule data.
//!
//! Rules are plain data: a map from [`Category`] to [`RuleAction`] plus a
//! default action for unconfigured categories. They are loaded from
//! [`RuleSet`] documents and can be swapped at runtime without touching the
//! detector.

mod action;
mod decision;
mod document;

pub use action::RuleAction;
pub use decision::Decision;
pub use document::{RuleSet, TenantRules};

use crate::detector::Category;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rules resolved for a single tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPolicy {
    /// Tenant these rules belong to
    pub tenant_id: String,
    /// Action for categories without an explicit rule
    #[serde(default)]
    pub default_action: RuleAction,
    /// Explicit per-category actions
    #[serde(default)]
    pub rules: BTreeMap<Category, RuleAction>,
}

impl TenantPolicy {
    /// Create a fail-closed policy with no explicit rules.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            default_action: RuleAction::default(),
            rules: BTreeMap::new(),
        }
    }

    /// Set the action for one category.
    pub fn with_rule(mut self, category: Category, action: RuleAction) -> Self {
        self.rules.insert(category, action);
        self
    }

    /// Set the default action.
    pub fn with_default_action(mut self, action: RuleAction) -> Self {
        self.default_action = action;
        self
    }

    /// Resolve the action for a category.
    pub fn action_for(&self, category: Category) -> RuleAction {
        self.rules
            .get(&category)
            .copied()
            .unwrap_or(self.default_action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_category_uses_default() {
        let policy = TenantPolicy::new("acme").with_rule(Category::EmailAddress, RuleAction::Warn);

        assert_eq!(policy.action_for(Category::EmailAddress), RuleAction::Warn);
        assert_eq!(policy.action_for(Category::PhoneNumber), RuleAction::Block);

        let lenient = policy.with_default_action(RuleAction::Ignore);
        assert_eq!(lenient.action_for(Category::PhoneNumber), RuleAction::Ignore);
    }
}
