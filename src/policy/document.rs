//! Rule set documents.

use super::{RuleAction, TenantPolicy};
use crate::detector::Category;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A rule document covering the global posture and any tenant overrides.
///
/// ```yaml
/// api_version: governance.llm-dev-ops.io/v1
/// kind: RuleSet
/// default_action: block
/// rules:
///   email-address: warn
/// tenants:
///   - id: acme
///     rules:
///       phone-number: ignore
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// API version of the document format
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Kind of document
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Action for categories no rule mentions
    #[serde(default)]
    pub default_action: RuleAction,
    /// Rules applied to every tenant
    #[serde(default)]
    pub rules: BTreeMap<Category, RuleAction>,
    /// Tenant-specific overrides
    #[serde(default)]
    pub tenants: Vec<TenantRules>,
}

/// Overrides for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRules {
    /// Tenant identifier
    pub id: String,
    /// Replaces the global default action for this tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_action: Option<RuleAction>,
    /// Per-category actions taking precedence over global rules
    #[serde(default)]
    pub rules: BTreeMap<Category, RuleAction>,
}

fn default_api_version() -> String {
    "governance.llm-dev-ops.io/v1".to_string()
}

fn default_kind() -> String {
    "RuleSet".to_string()
}

impl RuleSet {
    /// Create a fail-closed rule set with no explicit rules.
    pub fn new() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            default_action: RuleAction::default(),
            rules: BTreeMap::new(),
            tenants: Vec::new(),
        }
    }

    /// Set the global default action.
    pub fn with_default_action(mut self, action: RuleAction) -> Self {
        self.default_action = action;
        self
    }

    /// Set a global rule.
    pub fn with_rule(mut self, category: Category, action: RuleAction) -> Self {
        self.rules.insert(category, action);
        self
    }

    /// Add tenant overrides.
    pub fn with_tenant(mut self, tenant: TenantRules) -> Self {
        self.tenants.push(tenant);
        self
    }

    /// Parse a rule set from YAML.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        serde_yaml::from_str(yaml).map_err(crate::Error::from)
    }

    /// Parse a rule set from JSON.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(crate::Error::from)
    }

    /// Load a rule set from a file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match extension.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Self::from_yaml(&content).or_else(|_| Self::from_json(&content)),
        }
    }

    /// Convert the rule set to YAML.
    pub fn to_yaml(&self) -> crate::Result<String> {
        serde_yaml::to_string(self).map_err(crate::Error::from)
    }

    /// Convert the rule set to JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(crate::Error::from)
    }

    /// Validate the rule set.
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for (i, tenant) in self.tenants.iter().enumerate() {
            if tenant.id.trim().is_empty() {
                return Err(crate::Error::validation_field(
                    "Tenant ID cannot be empty",
                    format!("tenants[{}].id", i),
                ));
            }
            if !seen.insert(tenant.id.as_str()) {
                return Err(crate::Error::validation_field(
                    format!("Duplicate tenant: {}", tenant.id),
                    format!("tenants[{}].id", i),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the effective rules for a tenant.
    ///
    /// Precedence: tenant rule, global rule, tenant default, global default.
    pub fn resolve(&self, tenant_id: &str) -> TenantPolicy {
        let overrides = self.tenants.iter().find(|t| t.id == tenant_id);

        let mut rules = self.rules.clone();
        let mut default_action = self.default_action;
        if let Some(tenant) = overrides {
            rules.extend(tenant.rules.iter().map(|(c, a)| (*c, *a)));
            if let Some(action) = tenant.default_action {
                default_action = action;
            }
        }

        TenantPolicy {
            tenant_id: tenant_id.to_string(),
            default_action,
            rules,
        }
    }

    /// IDs of tenants with explicit overrides.
    pub fn tenant_ids(&self) -> Vec<&str> {
        self.tenants.iter().map(|t| t.id.as_str()).collect()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantRules {
    /// Create empty overrides for a tenant.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_action: None,
            rules: BTreeMap::new(),
        }
    }

    /// Set a tenant rule.
    pub fn with_rule(mut self, category: Category, action: RuleAction) -> Self {
        self.rules.insert(category, action);
        self
    }

    /// Set the tenant default action.
    pub fn with_default_action(mut self, action: RuleAction) -> Self {
        self.default_action = Some(action);
        self
    }
}
