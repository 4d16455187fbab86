//! Reconciles call reports with pre-check contexts and persists them.

use super::{estimate_cost_usd, truncate_summary, AuditRecord, AuditStore, CallReport};
use crate::config::AuditConfig;
use crate::context::{ContextStore, PreCheckContext};
use crate::telemetry::Telemetry;
use crate::{Error, Result};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Retry schedule for recoverable persistence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Base delay, multiplied by the attempt number
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Identity the audit caller claims to act for.
///
/// A claim that names a tenant or requester different from the one recorded
/// at pre-check time makes the context invisible to that caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerClaim {
    /// Claimed tenant
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Claimed requester
    #[serde(default)]
    pub requester_id: Option<String>,
}

impl CallerClaim {
    /// A claim that asserts nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether the claim is compatible with a context.
    pub fn matches(&self, context: &PreCheckContext) -> bool {
        self.tenant_id
            .as_deref()
            .map_or(true, |t| t == context.tenant_id)
            && self
                .requester_id
                .as_deref()
                .map_or(true, |r| r == context.requester_id)
    }
}

/// Turns call reports into persisted audit records.
pub struct AuditRecorder {
    contexts: Arc<ContextStore>,
    store: Arc<dyn AuditStore>,
    retry: RetryPolicy,
    timeout: Duration,
    max_summary_chars: usize,
    max_metadata_bytes: usize,
    telemetry: Option<Telemetry>,
}

impl AuditRecorder {
    /// Create a recorder over a context store and an audit store.
    pub fn new(contexts: Arc<ContextStore>, store: Arc<dyn AuditStore>, config: &AuditConfig) -> Self {
        Self {
            contexts,
            store,
            retry: RetryPolicy {
                max_attempts: config.retry_attempts.max(1),
                backoff: config.retry_backoff(),
            },
            timeout: config.timeout(),
            max_summary_chars: config.max_summary_chars,
            max_metadata_bytes: config.max_metadata_bytes,
            telemetry: None,
        }
    }

    /// Attach metrics.
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Override the retry schedule.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            ..retry
        };
        self
    }

    /// Audit store in use.
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Record a call with the configured timeout and no identity claim.
    pub async fn record(&self, correlation_id: &str, report: CallReport) -> Result<AuditRecord> {
        self.record_with(correlation_id, report, &CallerClaim::none(), self.timeout)
            .await
    }

    /// Record a call with an explicit timeout.
    pub async fn record_with_timeout(
        &self,
        correlation_id: &str,
        report: CallReport,
        timeout: Duration,
    ) -> Result<AuditRecord> {
        self.record_with(correlation_id, report, &CallerClaim::none(), timeout)
            .await
    }

    /// Record a call.
    ///
    /// The context is consumed before anything else happens, so of many
    /// concurrent calls for one correlation id at most one gets past this
    /// point. A report that fails validation, or whose persistence fails
    /// after every retry, releases the context again. A timeout does not:
    /// the write may still land, and a second record must never follow it.
    pub async fn record_with(
        &self,
        correlation_id: &str,
        report: CallReport,
        claim: &CallerClaim,
        timeout: Duration,
    ) -> Result<AuditRecord> {
        let started = Instant::now();
        let result = self.reconcile(correlation_id, report, claim, timeout).await;

        if let Some(telemetry) = &self.telemetry {
            match &result {
                Ok(record) => telemetry.record_audit(record, started.elapsed()),
                Err(e) => telemetry.record_audit_failure(e, started.elapsed()),
            }
        }
        result
    }

    async fn reconcile(
        &self,
        correlation_id: &str,
        report: CallReport,
        claim: &CallerClaim,
        timeout: Duration,
    ) -> Result<AuditRecord> {
        let context = self
            .contexts
            .consume_if(correlation_id, |context| claim.matches(context))?;

        if !context.decision.is_approved() {
            warn!(
                correlation_id,
                tenant_id = %context.tenant_id,
                "Audit submitted for a blocked pre-check"
            );
            return Err(Error::blocked_context(correlation_id));
        }

        if let Err(e) = report.check(self.max_metadata_bytes) {
            self.contexts.release(correlation_id);
            return Err(e);
        }

        let record = self.build_record(&context, report);

        match tokio::time::timeout(timeout, self.persist_with_retry(&record)).await {
            Ok(Ok(())) => {
                info!(
                    correlation_id,
                    audit_id = %record.audit_id,
                    tenant_id = %record.tenant_id,
                    provider = %record.provider,
                    model = %record.model,
                    total_tokens = record.usage.total_tokens,
                    "Audit record persisted"
                );
                Ok(record)
            }
            Ok(Err(e)) => {
                if e.is_recoverable() && self.contexts.release(correlation_id) {
                    debug!(correlation_id, "Context released after persistence failure");
                }
                Err(e)
            }
            Err(_) => {
                warn!(
                    correlation_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Audit persistence timed out; context stays consumed"
                );
                Err(Error::timeout(
                    format!("Audit persistence for {} timed out", correlation_id),
                    timeout.as_millis() as u64,
                ))
            }
        }
    }

    fn build_record(&self, context: &PreCheckContext, report: CallReport) -> AuditRecord {
        let (response_summary, summary_truncated) =
            truncate_summary(&report.response_summary, self.max_summary_chars);
        let estimated_cost_usd =
            estimate_cost_usd(&report.provider, &report.model, report.usage.total_tokens);

        AuditRecord {
            audit_id: Uuid::new_v4().to_string(),
            correlation_id: context.correlation_id.clone(),
            tenant_id: context.tenant_id.clone(),
            requester_id: context.requester_id.clone(),
            fingerprint: context.fingerprint.as_str().to_string(),
            matched_policies: context.matched_policies.clone(),
            response_summary,
            summary_truncated,
            provider: report.provider,
            model: report.model,
            usage: report.usage,
            latency_ms: u64::try_from(report.latency_ms).unwrap_or(0),
            estimated_cost_usd,
            metadata: report.metadata,
            precheck_at: context.created_at,
            persisted_at: Utc::now(),
        }
    }

    async fn persist_with_retry(&self, record: &AuditRecord) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.persist(record).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_recoverable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        correlation_id = %record.correlation_id,
                        backend = self.store.backend(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying audit persistence"
                    );
                    if let Some(telemetry) = &self.telemetry {
                        telemetry.record_persist_retry();
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
