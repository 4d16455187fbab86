//! Short-lived pre-check contexts keyed by correlation identifier.

mod store;

pub use store::{ContextStats, ContextStore, SweepReport};

use crate::detector::Finding;
use crate::policy::Decision;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable digest of the requester identity and the query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Compute the fingerprint of a request.
    pub fn compute(requester_id: &str, query: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(requester_id.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(query.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the store needs to create a context.
#[derive(Debug, Clone)]
pub struct ContextDraft {
    /// Tenant whose rules produced the decision
    pub tenant_id: String,
    /// Caller identity
    pub requester_id: String,
    /// Fingerprint of the inbound request
    pub fingerprint: RequestFingerprint,
    /// Approve or block
    pub decision: Decision,
    /// Findings in category order
    pub findings: Vec<Finding>,
    /// Present only when blocked
    pub block_reason: Option<String>,
    /// Categories reported to the caller
    pub matched_policies: Vec<String>,
    /// Data sources named by the caller
    pub data_sources: Vec<String>,
    /// Detector ruleset version used for the findings
    pub ruleset_version: String,
}

/// A pre-check decision awaiting its audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreCheckContext {
    /// Unguessable identifier issued to the caller
    pub correlation_id: String,
    /// Tenant whose rules produced the decision
    pub tenant_id: String,
    /// Caller identity
    pub requester_id: String,
    /// Fingerprint of the inbound request
    pub fingerprint: RequestFingerprint,
    /// Approve or block
    pub decision: Decision,
    /// Findings in category order
    pub findings: Vec<Finding>,
    /// Present only when blocked
    pub block_reason: Option<String>,
    /// Categories reported to the caller
    pub matched_policies: Vec<String>,
    /// Data sources named by the caller
    pub data_sources: Vec<String>,
    /// Detector ruleset version used for the findings
    pub ruleset_version: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// The context is unusable after this instant
    pub expires_at: DateTime<Utc>,
}

impl PreCheckContext {
    pub(crate) fn from_draft(
        draft: ContextDraft,
        correlation_id: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_id,
            tenant_id: draft.tenant_id,
            requester_id: draft.requester_id,
            fingerprint: draft.fingerprint,
            decision: draft.decision,
            findings: draft.findings,
            block_reason: draft.block_reason,
            matched_policies: draft.matched_policies,
            data_sources: draft.data_sources,
            ruleset_version: draft.ruleset_version,
            created_at,
            expires_at,
        }
    }

    /// Whether the context has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
