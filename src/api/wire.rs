//! Request and response types exchanged with callers.

use crate::audit::{AuditRecord, CallReport, CallerClaim};
use crate::context::PreCheckContext;
use crate::detector::{Category, Finding, Severity};
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound pre-check request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreCheckRequest {
    /// Identity of the caller on whose behalf the provider will be called
    #[serde(alias = "client_id")]
    pub requester_id: String,
    /// Text about to be sent to the provider
    pub query: String,
    /// Data sources the query draws on
    #[serde(default)]
    pub data_sources: Vec<String>,
    /// Opaque request context; size-bounded, never inspected by policy logic
    #[serde(default, alias = "context")]
    pub request_context: serde_json::Map<String, serde_json::Value>,
    /// Tenant whose rules apply; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl PreCheckRequest {
    /// Create a request with no data sources or context.
    pub fn new(requester_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            requester_id: requester_id.into(),
            query: query.into(),
            data_sources: Vec::new(),
            request_context: serde_json::Map::new(),
            tenant_id: None,
        }
    }

    /// Set the tenant.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the data sources.
    pub fn with_data_sources(mut self, sources: Vec<String>) -> Self {
        self.data_sources = sources;
        self
    }

    /// Add a request context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.request_context.insert(key.into(), value);
        self
    }

    pub(crate) fn check(&self, max_context_bytes: usize) -> Result<()> {
        if self.requester_id.trim().is_empty() {
            return Err(Error::validation_field("Requester cannot be blank", "requester_id"));
        }
        if self.query.is_empty() {
            return Err(Error::validation_field("Query cannot be empty", "query"));
        }
        if matches!(&self.tenant_id, Some(t) if t.trim().is_empty()) {
            return Err(Error::validation_field("Tenant cannot be blank", "tenant_id"));
        }
        let size = serde_json::to_vec(&self.request_context)?.len();
        if size > max_context_bytes {
            return Err(Error::validation_field(
                format!("Request context is {} bytes, limit is {}", size, max_context_bytes),
                "request_context",
            ));
        }
        Ok(())
    }
}

/// A finding as shown to callers. The matched text itself is never echoed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingView {
    /// Category of the finding
    pub category: Category,
    /// Severity of the category
    pub severity: Severity,
    /// Byte offset where the match starts
    pub start: usize,
    /// Byte offset where the match ends
    pub end: usize,
    /// Masked hint of the matched text
    pub redacted: String,
}

impl From<&Finding> for FindingView {
    fn from(finding: &Finding) -> Self {
        Self {
            category: finding.category,
            severity: finding.severity,
            start: finding.span.start,
            end: finding.span.end,
            redacted: finding.redacted.clone(),
        }
    }
}

/// Outcome of a pre-check. A block is a successful outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreCheckResponse {
    /// Identifier to quote when auditing the call
    #[serde(alias = "context_id")]
    pub correlation_id: String,
    /// Whether the provider call may proceed
    pub approved: bool,
    /// Why the request was blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    /// Categories whose rule resolved to block or warn
    #[serde(default, alias = "policies")]
    pub matched_policies: Vec<String>,
    /// Findings in category order
    #[serde(default)]
    pub findings: Vec<FindingView>,
    /// Deadline for the audit
    pub expires_at: DateTime<Utc>,
}

impl From<&PreCheckContext> for PreCheckResponse {
    fn from(context: &PreCheckContext) -> Self {
        Self {
            correlation_id: context.correlation_id.clone(),
            approved: context.decision.is_approved(),
            block_reason: context.block_reason.clone(),
            matched_policies: context.matched_policies.clone(),
            findings: context.findings.iter().map(FindingView::from).collect(),
            expires_at: context.expires_at,
        }
    }
}

/// Inbound audit of a completed provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRequest {
    /// Identifier returned by the pre-check
    #[serde(alias = "context_id")]
    pub correlation_id: String,
    /// What the caller observed
    #[serde(flatten)]
    pub report: CallReport,
    /// Tenant the caller claims to act for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Requester the caller claims to act for
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "client_id")]
    pub requester_id: Option<String>,
}

impl AuditRequest {
    /// Create an audit request without identity claims.
    pub fn new(correlation_id: impl Into<String>, report: CallReport) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            report,
            tenant_id: None,
            requester_id: None,
        }
    }

    /// Claim a tenant and requester.
    pub fn claiming(mut self, tenant_id: impl Into<String>, requester_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.requester_id = Some(requester_id.into());
        self
    }

    /// Identity claim carried by the request.
    pub fn claim(&self) -> CallerClaim {
        CallerClaim {
            tenant_id: self.tenant_id.clone(),
            requester_id: self.requester_id.clone(),
        }
    }
}

/// Confirmation of a persisted audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResponse {
    /// Always true
    pub success: bool,
    /// Identifier of the persisted record
    pub audit_id: String,
    /// Context the record settled
    pub correlation_id: String,
    /// Cost estimate stored with the record
    pub estimated_cost_usd: f64,
    /// When the record was persisted
    pub persisted_at: DateTime<Utc>,
}

impl From<&AuditRecord> for AuditResponse {
    fn from(record: &AuditRecord) -> Self {
        Self {
            success: true,
            audit_id: record.audit_id.clone(),
            correlation_id: record.correlation_id.clone(),
            estimated_cost_usd: record.estimated_cost_usd,
            persisted_at: record.persisted_at,
        }
    }
}

/// Error body returned at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always false
    pub success: bool,
    /// Stable error code
    pub error: String,
    /// Message safe for untrusted callers
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(error: &Error) -> Self {
        Self {
            success: false,
            error: error.wire_code().to_string(),
            message: error.wire_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TokenUsage;
    use serde_json::json;

    #[test]
    fn test_pre_check_request_aliases() {
        let request: PreCheckRequest = serde_json::from_value(json!({
            "client_id": "support-bot",
            "query": "hello",
            "context": {"channel": "chat"}
        }))
        .unwrap();

        assert_eq!(request.requester_id, "support-bot");
        assert_eq!(request.request_context["channel"], json!("chat"));
        assert!(request.tenant_id.is_none());
        assert!(request.check(1024).is_ok());
    }

    #[test]
    fn test_pre_check_request_checks() {
        assert!(PreCheckRequest::new("", "hello").check(1024).is_err());
        assert!(PreCheckRequest::new("user", "").check(1024).is_err());
        assert!(PreCheckRequest::new("user", "hi")
            .with_tenant(" ")
            .check(1024)
            .is_err());

        let bulky = PreCheckRequest::new("user", "hi").with_context("blob", json!("x".repeat(100)));
        let err = bulky.check(16).unwrap_err();
        assert!(matches!(err, Error::Validation { field: Some(ref f), .. } if f == "request_context"));
    }

    #[test]
    fn test_audit_request_flattens_report() {
        let request: AuditRequest = serde_json::from_value(json!({
            "context_id": "abc",
            "response_summary": "Paris is the capital.",
            "provider": "openai",
            "model": "gpt-3.5-turbo",
            "usage": {"prompt_tokens": 20, "completion_tokens": 30, "total_tokens": 50},
            "latency_ms": 420,
            "client_id": "support-bot"
        }))
        .unwrap();

        assert_eq!(request.correlation_id, "abc");
        assert_eq!(request.report.usage, TokenUsage::new(20, 30));
        assert_eq!(request.claim().requester_id.as_deref(), Some("support-bot"));
        assert!(request.claim().tenant_id.is_none());
    }

    #[test]
    fn test_error_body_masks_rejections() {
        let expired = ErrorBody::from(&Error::context_expired("abc"));
        let unknown = ErrorBody::from(&Error::context_not_found("xyz"));
        assert_eq!(expired, unknown);
        assert_eq!(expired.error, "audit_rejected");
        assert!(!expired.message.contains("abc"));

        let invalid = ErrorBody::from(&Error::validation_field("bad tokens", "usage.total_tokens"));
        assert_eq!(invalid.error, "invalid_request");
    }
}
