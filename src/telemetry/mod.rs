//! Telemetry and observability for the governance gateway.
//!
//! Structured logging goes through `tracing`; counters and latency histograms
//! are kept in a Prometheus registry rendered by the HTTP `/metrics` route.

use crate::audit::{metric_labels, AuditRecord};
use crate::config::TelemetryConfig;
use crate::detector::Finding;
use crate::policy::Decision;
use crate::{Error, Result};

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

fn metric_error(e: prometheus::Error) -> Error {
    Error::telemetry(e.to_string())
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::config_key(format!("Invalid log level: {}", e), "telemetry.log_level"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| Error::telemetry(format!("Failed to set logging subscriber: {}", e)))
}

/// Prometheus instruments for pre-checks and audits.
///
/// Cloning is cheap; clones share the same underlying metrics.
#[derive(Clone)]
pub struct Telemetry {
    config: TelemetryConfig,
    registry: Registry,
    precheck_total: IntCounterVec,
    precheck_duration: Histogram,
    findings_total: IntCounterVec,
    audit_total: IntCounterVec,
    audit_duration: Histogram,
    persist_retries: IntCounter,
    tokens_total: IntCounterVec,
    cost_usd_total: CounterVec,
    contexts_expired_unaudited: IntCounter,
    contexts_live: IntGauge,
}

impl Telemetry {
    /// Create and register all instruments.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let registry = Registry::new();

        let precheck_total = IntCounterVec::new(
            Opts::new("governance_precheck_total", "Pre-checks by decision"),
            &["decision"],
        )
        .map_err(metric_error)?;
        let precheck_duration = Histogram::with_opts(
            HistogramOpts::new(
                "governance_precheck_duration_seconds",
                "Pre-check latency",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )
        .map_err(metric_error)?;
        let findings_total = IntCounterVec::new(
            Opts::new("governance_findings_total", "Detector findings by category"),
            &["category"],
        )
        .map_err(metric_error)?;
        let audit_total = IntCounterVec::new(
            Opts::new("governance_audit_total", "Audit attempts by outcome"),
            &["outcome"],
        )
        .map_err(metric_error)?;
        let audit_duration = Histogram::with_opts(
            HistogramOpts::new("governance_audit_duration_seconds", "Audit latency")
                .buckets(LATENCY_BUCKETS.to_vec()),
        )
        .map_err(metric_error)?;
        let persist_retries = IntCounter::new(
            "governance_audit_persist_retries_total",
            "Audit persistence attempts that were retried",
        )
        .map_err(metric_error)?;
        let tokens_total = IntCounterVec::new(
            Opts::new("governance_llm_tokens_total", "Audited tokens"),
            &["provider", "model", "kind"],
        )
        .map_err(metric_error)?;
        let cost_usd_total = CounterVec::new(
            Opts::new("governance_llm_cost_usd_total", "Estimated audited cost"),
            &["provider", "model"],
        )
        .map_err(metric_error)?;
        let contexts_expired_unaudited = IntCounter::new(
            "governance_contexts_expired_unaudited_total",
            "Approved pre-checks that expired without an audit",
        )
        .map_err(metric_error)?;
        let contexts_live = IntGauge::new(
            "governance_contexts_live",
            "Contexts currently held by the store",
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(precheck_total.clone()))
            .and_then(|_| registry.register(Box::new(precheck_duration.clone())))
            .and_then(|_| registry.register(Box::new(findings_total.clone())))
            .and_then(|_| registry.register(Box::new(audit_total.clone())))
            .and_then(|_| registry.register(Box::new(audit_duration.clone())))
            .and_then(|_| registry.register(Box::new(persist_retries.clone())))
            .and_then(|_| registry.register(Box::new(tokens_total.clone())))
            .and_then(|_| registry.register(Box::new(cost_usd_total.clone())))
            .and_then(|_| registry.register(Box::new(contexts_expired_unaudited.clone())))
            .and_then(|_| registry.register(Box::new(contexts_live.clone())))
            .map_err(metric_error)?;

        Ok(Self {
            config: config.clone(),
            registry,
            precheck_total,
            precheck_duration,
            findings_total,
            audit_total,
            audit_duration,
            persist_retries,
            tokens_total,
            cost_usd_total,
            contexts_expired_unaudited,
            contexts_live,
        })
    }

    /// Record a pre-check.
    pub fn record_precheck(&self, decision: Decision, findings: &[Finding], duration: Duration) {
        self.precheck_total
            .with_label_values(&[decision.as_str()])
            .inc();
        self.precheck_duration.observe(duration.as_secs_f64());
        for finding in findings {
            self.findings_total
                .with_label_values(&[finding.category.as_str()])
                .inc();
        }
    }

    /// Record a persisted audit.
    pub fn record_audit(&self, record: &AuditRecord, duration: Duration) {
        self.audit_total.with_label_values(&["recorded"]).inc();
        self.audit_duration.observe(duration.as_secs_f64());

        let (provider, model) = metric_labels(&record.provider, &record.model);
        for (kind, count) in [
            ("prompt", record.usage.prompt_tokens),
            ("completion", record.usage.completion_tokens),
        ] {
            self.tokens_total
                .with_label_values(&[provider, model, kind])
                .inc_by(count);
        }
        self.cost_usd_total
            .with_label_values(&[provider, model])
            .inc_by(record.estimated_cost_usd);
    }

    /// Record a failed audit.
    pub fn record_audit_failure(&self, error: &Error, duration: Duration) {
        self.audit_total.with_label_values(&[error.category()]).inc();
        self.audit_duration.observe(duration.as_secs_f64());
    }

    /// Record one retried persistence attempt.
    pub fn record_persist_retry(&self) {
        self.persist_retries.inc();
    }

    /// Record approved contexts that expired without an audit.
    pub fn record_expired_unaudited(&self, count: usize) {
        self.contexts_expired_unaudited.inc_by(count as u64);
    }

    /// Update the live context gauge.
    pub fn set_live_contexts(&self, count: usize) {
        self.contexts_live.set(count as i64);
    }

    /// Get a snapshot of the main counters.
    pub fn metrics(&self) -> TelemetryMetrics {
        let prechecks_approved = self.precheck_total.with_label_values(&["approved"]).get();
        let prechecks_blocked = self.precheck_total.with_label_values(&["blocked"]).get();
        let audits_recorded = self.audit_total.with_label_values(&["recorded"]).get();
        let audits_total: u64 = self
            .registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == "governance_audit_total")
            .flat_map(|family| family.get_metric().iter())
            .map(|m| m.get_counter().get_value() as u64)
            .sum();

        TelemetryMetrics {
            prechecks_approved,
            prechecks_blocked,
            audits_recorded,
            audits_failed: audits_total.saturating_sub(audits_recorded),
            persist_retries: self.persist_retries.get(),
            contexts_expired_unaudited: self.contexts_expired_unaudited.get(),
        }
    }

    /// Render every metric in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| Error::telemetry(e.to_string()))
    }

    /// Check if telemetry is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the service name.
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

/// Snapshot of the main counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    /// Approved pre-checks
    pub prechecks_approved: u64,
    /// Blocked pre-checks
    pub prechecks_blocked: u64,
    /// Persisted audits
    pub audits_recorded: u64,
    /// Rejected or failed audits
    pub audits_failed: u64,
    /// Retried persistence attempts
    pub persist_retries: u64,
    /// Approved contexts that expired unaudited
    pub contexts_expired_unaudited: u64,
}
