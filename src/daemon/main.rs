//! Governance Gateway Daemon
//!
//! Serves pre-check and audit requests over HTTP.

use llm_governance_gateway::config::AuditBackend;
use llm_governance_gateway::{server, telemetry, Config, GovernanceEngine};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Governance Gateway Daemon
#[derive(Parser, Debug)]
#[command(name = "governance-gateway")]
#[command(about = "Policy pre-check and audit correlation service for LLM calls")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "GOVERNANCE_CONFIG")]
    config: Option<PathBuf>,

    /// Tenant rule document, reloaded on SIGHUP
    #[arg(short, long, env = "GOVERNANCE_RULES")]
    rules: Option<PathBuf>,

    /// HTTP bind host
    #[arg(long)]
    host: Option<String>,

    /// HTTP server port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON log format
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Audit storage backend (memory, jsonl, postgres)
    #[arg(long)]
    audit_backend: Option<String>,

    /// File used by the JSONL audit backend
    #[arg(long)]
    audit_jsonl: Option<PathBuf>,

    /// Context time-to-live in seconds
    #[arg(long)]
    context_ttl_secs: Option<u64>,

    /// Disable telemetry
    #[arg(long)]
    no_telemetry: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(ref rules) = self.rules {
            config.rules.file = Some(rules.clone());
        }
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            config.telemetry.log_level = level.clone();
        }
        if self.json_logs {
            config.telemetry.json_logs = true;
        }
        if let Some(ref backend) = self.audit_backend {
            config.audit.backend = backend
                .parse::<AuditBackend>()
                .context("parsing --audit-backend")?;
        }
        if let Some(ref path) = self.audit_jsonl {
            config.audit.jsonl_path = Some(path.clone());
        }
        if let Some(ttl) = self.context_ttl_secs {
            config.context.ttl_secs = ttl;
        }
        if self.no_telemetry {
            config.telemetry.enabled = false;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::from_env().context("loading configuration from environment")?,
    };
    args.apply(&mut config)?;
    config.validate().context("validating configuration")?;

    telemetry::init_logging(&config.telemetry.log_level, config.telemetry.json_logs)?;

    info!(
        "Starting Governance Gateway Daemon v{}",
        llm_governance_gateway::VERSION
    );

    let engine = Arc::new(
        GovernanceEngine::builder()
            .with_config(config.clone())
            .build()
            .await
            .context("building governance engine")?,
    );

    let sweeper = engine.spawn_sweeper(config.context.sweep_interval());

    watch_rules(&engine, &config);

    info!(
        address = %config.server.bind_address(),
        audit_backend = ?config.audit.backend,
        ttl_secs = config.context.ttl_secs,
        telemetry = config.telemetry.enabled,
        "Governance Gateway Daemon ready"
    );

    server::serve(
        Arc::clone(&engine),
        &config.server.bind_address(),
        shutdown_signal(),
    )
    .await
    .context("serving HTTP")?;

    sweeper.abort();
    let report = engine.sweep_expired();
    info!(
        pending_contexts = engine.metrics().contexts.live,
        reclaimed = report.removed,
        "Shutting down Governance Gateway Daemon"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
fn watch_rules(engine: &Arc<GovernanceEngine>, config: &Config) {
    if let Some(path) = config.rules.file.clone() {
        tokio::spawn(reload_on_hangup(Arc::clone(engine), path));
    }
}

#[cfg(not(unix))]
fn watch_rules(_engine: &Arc<GovernanceEngine>, _config: &Config) {}

#[cfg(unix)]
async fn reload_on_hangup(engine: Arc<GovernanceEngine>, path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "SIGHUP handler unavailable; rule reload disabled");
            return;
        }
    };

    while hangups.recv().await.is_some() {
        match engine.reload_rules_file(&path) {
            Ok(()) => info!(path = %path.display(), "Rules reloaded"),
            Err(e) => warn!(path = %path.display(), error = %e, "Rule reload failed; keeping previous rules"),
        }
    }
}
