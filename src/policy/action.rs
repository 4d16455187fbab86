//! Per-category rule actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a tenant rule does with a finding of its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Block the request
    Block,
    /// Allow, but keep the finding visible in the context
    Warn,
    /// Drop the finding from the decision
    Ignore,
}

impl RuleAction {
    /// Check if this action blocks the request.
    pub fn is_blocking(&self) -> bool {
        matches!(self, RuleAction::Block)
    }

    /// Check if findings under this action are reported as matched policies.
    pub fn is_reported(&self) -> bool {
        !matches!(self, RuleAction::Ignore)
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Block => "block",
            RuleAction::Warn => "warn",
            RuleAction::Ignore => "ignore",
        }
    }
}

/// Unconfigured categories fail closed.
impl Default for RuleAction {
    fn default() -> Self {
        RuleAction::Block
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RuleAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" => Ok(RuleAction::Block),
            "warn" => Ok(RuleAction::Warn),
            "ignore" => Ok(RuleAction::Ignore),
            _ => Err(crate::Error::parse(format!("Unknown rule action: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fail_closed() {
        assert_eq!(RuleAction::default(), RuleAction::Block);
        assert!(RuleAction::default().is_blocking());
    }

    #[test]
    fn test_reporting() {
        assert!(RuleAction::Block.is_reported());
        assert!(RuleAction::Warn.is_reported());
        assert!(!RuleAction::Ignore.is_reported());
        assert!(!RuleAction::Warn.is_blocking());
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("WARN".parse::<RuleAction>().unwrap(), RuleAction::Warn);
        assert!("deny".parse::<RuleAction>().is_err());
    }
}
