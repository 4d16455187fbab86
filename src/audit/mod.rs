//! Audit records for completed provider calls.
//!
//! A caller reports a finished call as a [`CallReport`]. The
//! [`AuditRecorder`] reconciles it with the pre-check context it references
//! and persists an immutable [`AuditRecord`] through an [`AuditStore`].

mod pricing;
mod recorder;
mod storage;

pub use pricing::{estimate_cost_usd, metric_labels, OTHER_LABEL};
pub use recorder::{AuditRecorder, CallerClaim, RetryPolicy};
pub use storage::{open as open_store, AuditStore, JsonlAuditStore, MemoryAuditStore};
#[cfg(feature = "postgres-storage")]
pub use storage::PostgresAuditStore;

use crate::{Error, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Appended to response summaries that exceed the configured bound.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Token accounting reported by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u64,
    /// Tokens in the completion
    pub completion_tokens: u64,
    /// Must equal prompt plus completion
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build a consistent triple.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Whether `total == prompt + completion` without overflow.
    pub fn is_consistent(&self) -> bool {
        self.prompt_tokens
            .checked_add(self.completion_tokens)
            .map_or(false, |sum| sum == self.total_tokens)
    }
}

/// What the caller observed about a completed provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CallReport {
    /// Provider output summary; truncated to the configured bound
    pub response_summary: String,
    /// Provider name, e.g. `openai`
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    /// Model name, e.g. `gpt-4o`
    #[validate(length(min = 1, max = 128))]
    pub model: String,
    /// Token accounting
    #[serde(alias = "token_usage")]
    pub usage: TokenUsage,
    /// Wall-clock latency of the provider call
    pub latency_ms: i64,
    /// Opaque caller metadata, size-bounded and never interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CallReport {
    /// Create a report without metadata.
    pub fn new(
        response_summary: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        usage: TokenUsage,
        latency_ms: i64,
    ) -> Self {
        Self {
            response_summary: response_summary.into(),
            provider: provider.into(),
            model: model.into(),
            usage,
            latency_ms,
            metadata: None,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check the report before anything is persisted.
    pub fn check(&self, max_metadata_bytes: usize) -> Result<()> {
        if let Err(errors) = Validate::validate(self) {
            let field = errors
                .field_errors()
                .keys()
                .next()
                .map(|f| f.to_string())
                .unwrap_or_default();
            return Err(Error::validation_field(
                format!("Invalid call report: {}", errors),
                field,
            ));
        }
        if self.provider.trim().is_empty() {
            return Err(Error::validation_field("Provider cannot be blank", "provider"));
        }
        if self.model.trim().is_empty() {
            return Err(Error::validation_field("Model cannot be blank", "model"));
        }
        if self.latency_ms < 0 {
            return Err(Error::validation_field(
                format!("Latency cannot be negative: {}", self.latency_ms),
                "latency_ms",
            ));
        }
        if !self.usage.is_consistent() {
            return Err(Error::validation_field(
                format!(
                    "Token usage mismatch: prompt {} + completion {} != total {}",
                    self.usage.prompt_tokens, self.usage.completion_tokens, self.usage.total_tokens
                ),
                "usage.total_tokens",
            ));
        }
        if let Some(metadata) = &self.metadata {
            let size = serde_json::to_vec(metadata)?.len();
            if size > max_metadata_bytes {
                return Err(Error::validation_field(
                    format!("Metadata is {} bytes, limit is {}", size, max_metadata_bytes),
                    "metadata",
                ));
            }
        }
        Ok(())
    }
}

/// Immutable record of an audited provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Identifier assigned at persistence
    pub audit_id: String,
    /// Pre-check context this record settles
    pub correlation_id: String,
    /// Tenant of the pre-check
    pub tenant_id: String,
    /// Caller identity of the pre-check
    pub requester_id: String,
    /// Fingerprint of the pre-checked request
    pub fingerprint: String,
    /// Categories reported at pre-check time
    #[serde(default)]
    pub matched_policies: Vec<String>,
    /// Bounded response summary
    pub response_summary: String,
    /// Whether the summary was cut
    pub summary_truncated: bool,
    /// Provider name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Token accounting
    pub usage: TokenUsage,
    /// Provider call latency
    pub latency_ms: u64,
    /// Cost estimate from the pricing table
    pub estimated_cost_usd: f64,
    /// Opaque caller metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// When the pre-check ran
    pub precheck_at: DateTime<Utc>,
    /// When the record was persisted
    pub persisted_at: DateTime<Utc>,
}

/// Filter for audit retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Tenant whose records are returned
    pub tenant_id: String,
    /// Inclusive lower bound on `persisted_at`
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `persisted_at`
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of records, oldest first
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AuditQuery {
    /// All records of a tenant.
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            from: None,
            to: None,
            limit: None,
        }
    }

    /// Restrict to a time range.
    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Cap the number of results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record satisfies the filter.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        record.tenant_id == self.tenant_id
            && self.from.map_or(true, |from| record.persisted_at >= from)
            && self.to.map_or(true, |to| record.persisted_at < to)
    }

    /// Sort matching records oldest first and apply the limit.
    pub(crate) fn finish(&self, mut records: Vec<AuditRecord>) -> Vec<AuditRecord> {
        records.sort_by(|a, b| a.persisted_at.cmp(&b.persisted_at));
        if let Some(limit) = self.limit {
            records.truncate(limit);
        }
        records
    }
}

/// Cut `summary` to at most `max_chars` characters, marker included.
pub fn truncate_summary(summary: &str, max_chars: usize) -> (String, bool) {
    if summary.chars().count() <= max_chars {
        return (summary.to_string(), false);
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut truncated: String = summary.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    (truncated, true)
}
