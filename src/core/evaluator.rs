//! Policy evaluator implementation.

use crate::detector::{Category, Finding};
use crate::policy::{Decision, RuleAction, TenantPolicy};

use serde::{Deserialize, Serialize};

/// Result of evaluating findings against tenant rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Approve or block
    pub decision: Decision,
    /// Reason built from the first blocking category, present only when blocked
    pub block_reason: Option<String>,
    /// Categories whose rule resolved to block or warn, in category order
    pub matched_policies: Vec<String>,
    /// Categories that resolved to warn
    pub warnings: Vec<Category>,
}

impl Evaluation {
    /// Evaluation of a request without findings.
    pub fn approved() -> Self {
        Self {
            decision: Decision::Approved,
            block_reason: None,
            matched_policies: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Check if the request was approved.
    pub fn is_approved(&self) -> bool {
        self.decision.is_approved()
    }
}

/// Combines detector findings with tenant rules.
///
/// The evaluator holds no state: the same findings and rules always yield the
/// same evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Create a new evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Evaluate findings against a tenant policy.
    ///
    /// Findings arrive in category order, so the first blocking finding names
    /// the first blocking category.
    pub fn evaluate(&self, findings: &[Finding], policy: &TenantPolicy) -> Evaluation {
        let mut evaluation = Evaluation::approved();

        for finding in findings {
            let action = policy.action_for(finding.category);
            if !action.is_reported() {
                continue;
            }

            let name = finding.category.as_str();
            if !evaluation.matched_policies.iter().any(|p| p == name) {
                evaluation.matched_policies.push(name.to_string());
            }

            match action {
                RuleAction::Block if evaluation.block_reason.is_none() => {
                    evaluation.decision = Decision::Blocked;
                    evaluation.block_reason = Some(format!(
                        "Request blocked by policy: {} detected ({} severity)",
                        finding.category, finding.severity
                    ));
                }
                RuleAction::Warn if !evaluation.warnings.contains(&finding.category) => {
                    evaluation.warnings.push(finding.category);
                }
                _ => {}
            }
        }

        evaluation
    }
}
