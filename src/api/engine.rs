//! Governance engine implementation.

use super::{AuditRequest, AuditResponse, PreCheckRequest, PreCheckResponse};
use crate::audit::{self, AuditQuery, AuditRecord, AuditRecorder, AuditStore};
use crate::config::Config;
use crate::context::{ContextDraft, ContextStats, ContextStore, PreCheckContext, RequestFingerprint, SweepReport};
use crate::core::Evaluator;
use crate::detector::Detector;
use crate::policy::RuleSet;
use crate::telemetry::{Telemetry, TelemetryMetrics};
use crate::Result;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The governance facade: pre-checks requests and records audits.
pub struct GovernanceEngine {
    /// Compiled category matchers
    detector: Detector,
    /// Rule evaluator
    evaluator: Evaluator,
    /// Active rule set, swapped atomically on reload
    rules: ArcSwap<RuleSet>,
    /// Contexts awaiting their audit
    contexts: Arc<ContextStore>,
    /// Audit reconciliation and persistence
    recorder: AuditRecorder,
    /// Telemetry instance
    telemetry: Option<Telemetry>,
    /// Configuration
    config: Config,
}

impl GovernanceEngine {
    /// Create a governance engine builder.
    pub fn builder() -> GovernanceEngineBuilder {
        GovernanceEngineBuilder::new()
    }

    /// Pre-check a request before it is sent to a provider.
    ///
    /// Runs the detector, evaluates the findings against the tenant's rules
    /// and stores a context for the later audit. A blocked request is a
    /// successful outcome with `approved == false`.
    ///
    /// # Arguments
    /// * `request` - Requester, query and optional tenant
    ///
    /// # Returns
    /// * `Ok(PreCheckResponse)` - The decision and its correlation identifier
    /// * `Err(Error)` - If the request is malformed or the context store is full
    pub fn pre_check(&self, request: &PreCheckRequest) -> Result<PreCheckResponse> {
        let start = Instant::now();
        request.check(self.config.audit.max_metadata_bytes)?;

        let tenant_id = request
            .tenant_id
            .clone()
            .unwrap_or_else(|| self.config.rules.default_tenant.clone());

        let findings = self.detector.detect(&request.query);
        let policy = self.rules.load().resolve(&tenant_id);
        let evaluation = self.evaluator.evaluate(&findings, &policy);

        let context = self.contexts.put(ContextDraft {
            tenant_id,
            requester_id: request.requester_id.clone(),
            fingerprint: RequestFingerprint::compute(&request.requester_id, &request.query),
            decision: evaluation.decision,
            findings,
            block_reason: evaluation.block_reason,
            matched_policies: evaluation.matched_policies,
            data_sources: request.data_sources.clone(),
            ruleset_version: Detector::RULESET_VERSION.to_string(),
        })?;

        debug!(
            correlation_id = %context.correlation_id,
            tenant_id = %context.tenant_id,
            requester_id = %context.requester_id,
            decision = context.decision.as_str(),
            findings = context.findings.len(),
            "Pre-check decided"
        );

        if let Some(ref telemetry) = self.telemetry {
            telemetry.record_precheck(context.decision, &context.findings, start.elapsed());
            telemetry.set_live_contexts(self.contexts.len());
        }

        Ok(PreCheckResponse::from(&context))
    }

    /// Record the audit of a completed provider call with the configured timeout.
    pub async fn record_audit(&self, request: AuditRequest) -> Result<AuditResponse> {
        let timeout = self.config.audit.timeout();
        self.record_audit_with_timeout(request, timeout).await
    }

    /// Record the audit of a completed provider call.
    ///
    /// # Arguments
    /// * `request` - Correlation identifier, call report and optional identity claims
    /// * `timeout` - Upper bound on persistence, retries included
    ///
    /// # Returns
    /// * `Ok(AuditResponse)` - Once the record is durable
    /// * `Err(Error)` - Rejections, validation failures and persistence failures
    pub async fn record_audit_with_timeout(
        &self,
        request: AuditRequest,
        timeout: Duration,
    ) -> Result<AuditResponse> {
        let claim = request.claim();
        let record = self
            .recorder
            .record_with(&request.correlation_id, request.report, &claim, timeout)
            .await?;
        Ok(AuditResponse::from(&record))
    }

    /// Retrieve audit records of a tenant, oldest first.
    pub async fn audit_records(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        self.recorder.store().query(query).await
    }

    /// Look up a live context.
    pub fn context(&self, correlation_id: &str) -> Option<PreCheckContext> {
        self.contexts.get(correlation_id)
    }

    /// Snapshot of the active rule set.
    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }

    /// Replace the active rule set.
    ///
    /// In-flight pre-checks finish with the rules they started with.
    pub fn reload_rules(&self, rules: RuleSet) -> Result<()> {
        rules.validate()?;
        let tenants = rules.tenants.len();
        self.rules.store(Arc::new(rules));
        info!(tenants, "Rule set reloaded");
        Ok(())
    }

    /// Replace the active rule set from a YAML or JSON file.
    pub fn reload_rules_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.reload_rules(RuleSet::from_file(path)?)
    }

    /// Reclaim expired contexts once.
    pub fn sweep_expired(&self) -> SweepReport {
        let report = self.contexts.purge_expired();
        if report.removed > 0 {
            info!(
                removed = report.removed,
                unaudited = report.unaudited.len(),
                "Expired contexts reclaimed"
            );
        }
        if let Some(ref telemetry) = self.telemetry {
            telemetry.record_expired_unaudited(report.unaudited.len());
            telemetry.set_live_contexts(self.contexts.len());
        }
        report
    }

    /// Spawn a task sweeping expired contexts every `interval`.
    ///
    /// The task stops once the engine is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match engine.upgrade() {
                    Some(engine) => {
                        engine.sweep_expired();
                    }
                    None => break,
                }
            }
        })
    }

    /// Get the telemetry instance, if enabled.
    pub fn telemetry(&self) -> Option<&Telemetry> {
        self.telemetry.as_ref()
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get engine metrics.
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            audit_backend: self.recorder.store().backend().to_string(),
            ruleset_version: Detector::RULESET_VERSION.to_string(),
            tenant_overrides: self.rules.load().tenants.len(),
            contexts: self.contexts.stats(),
            telemetry: self.telemetry.as_ref().map(|t| t.metrics()),
        }
    }
}

/// Builder for creating a GovernanceEngine.
#[derive(Default)]
pub struct GovernanceEngineBuilder {
    config: Option<Config>,
    rules: Option<RuleSet>,
    rules_file: Option<PathBuf>,
    audit_store: Option<Arc<dyn AuditStore>>,
    telemetry: Option<Telemetry>,
    telemetry_enabled: Option<bool>,
}

impl GovernanceEngineBuilder {
    /// Create a new governance engine builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the initial rule set.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Load the initial rule set from a file.
    pub fn with_rules_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_file = Some(path.into());
        self
    }

    /// Use a specific audit store instead of the configured backend.
    pub fn with_audit_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.audit_store = Some(store);
        self
    }

    /// Use an existing telemetry instance.
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Enable or disable telemetry.
    pub fn with_telemetry_enabled(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = Some(enabled);
        self
    }

    /// Build the governance engine.
    pub async fn build(self) -> Result<GovernanceEngine> {
        let mut config = self.config.unwrap_or_default();
        if let Some(enabled) = self.telemetry_enabled {
            config.telemetry.enabled = enabled;
        }
        config.validate()?;

        let rules = match (self.rules, self.rules_file.or_else(|| config.rules.file.clone())) {
            (Some(rules), _) => rules,
            (None, Some(path)) => RuleSet::from_file(path)?,
            (None, None) => RuleSet::default(),
        };
        rules.validate()?;

        let store = match self.audit_store {
            Some(store) => store,
            None => audit::open_store(&config.audit).await?,
        };

        let telemetry = match self.telemetry {
            Some(telemetry) => Some(telemetry),
            None if config.telemetry.enabled => Some(Telemetry::new(&config.telemetry)?),
            None => None,
        };

        let contexts = Arc::new(ContextStore::new(
            config.context.ttl(),
            config.context.max_entries,
        ));

        let mut recorder = AuditRecorder::new(Arc::clone(&contexts), store, &config.audit);
        if let Some(ref telemetry) = telemetry {
            recorder = recorder.with_telemetry(telemetry.clone());
        }

        info!(
            audit_backend = recorder.store().backend(),
            ttl_secs = config.context.ttl_secs,
            tenants = rules.tenants.len(),
            "Governance engine ready"
        );

        Ok(GovernanceEngine {
            detector: Detector::new()?,
            evaluator: Evaluator::new(),
            rules: ArcSwap::from_pointee(rules),
            contexts,
            recorder,
            telemetry,
            config,
        })
    }
}

/// Engine metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Audit store backend
    pub audit_backend: String,
    /// Detector pattern table version
    pub ruleset_version: String,
    /// Tenants with rule overrides
    pub tenant_overrides: usize,
    /// Context store statistics
    pub contexts: ContextStats,
    /// Counter snapshot (if telemetry is enabled)
    pub telemetry: Option<TelemetryMetrics>,
}
