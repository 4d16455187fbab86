//! Configuration for the governance gateway.
//!
//! Configuration is layered: built-in defaults, then an optional file, then
//! environment variables prefixed with `GOVERNANCE__` (for example
//! `GOVERNANCE__CONTEXT__TTL_SECS=120`).

use crate::audit::TRUNCATION_MARKER;
use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "GOVERNANCE";
const ENV_SEPARATOR: &str = "__";

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Context store settings
    #[serde(default)]
    pub context: ContextConfig,
    /// Audit recorder settings
    #[serde(default)]
    pub audit: AuditConfig,
    /// Tenant rule settings
    #[serde(default)]
    pub rules: RulesConfig,
    /// Logging and metrics settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from defaults and the environment.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from defaults, a file, and the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| Error::config(format!("Failed to build defaults: {}", e)))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| Error::config(format!("Failed to load configuration: {}", e)))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.context.ttl_secs == 0 {
            return Err(Error::config_key("Context TTL must be positive", "context.ttl_secs"));
        }
        if self.context.max_entries == 0 {
            return Err(Error::config_key(
                "Context store must allow at least one entry",
                "context.max_entries",
            ));
        }
        if self.audit.retry_attempts == 0 {
            return Err(Error::config_key(
                "At least one persistence attempt is required",
                "audit.retry_attempts",
            ));
        }
        if self.audit.max_summary_chars <= TRUNCATION_MARKER.chars().count() {
            return Err(Error::config_key(
                format!(
                    "Summary bound must exceed the truncation marker ({} chars)",
                    TRUNCATION_MARKER.chars().count()
                ),
                "audit.max_summary_chars",
            ));
        }
        match self.audit.backend {
            AuditBackend::Jsonl if self.audit.jsonl_path.is_none() => {
                return Err(Error::config_key(
                    "JSONL backend requires a path",
                    "audit.jsonl_path",
                ));
            }
            AuditBackend::Postgres if self.audit.database_url.is_none() => {
                return Err(Error::config_key(
                    "Postgres backend requires a database URL",
                    "audit.database_url",
                ));
            }
            _ => {}
        }
        if self.rules.default_tenant.trim().is_empty() {
            return Err(Error::config_key(
                "Default tenant cannot be empty",
                "rules.default_tenant",
            ));
        }
        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// The `host:port` pair to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Context store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Seconds a pre-check context stays available for audit
    pub ttl_secs: u64,
    /// Seconds between background expiry sweeps
    pub sweep_interval_secs: u64,
    /// Maximum number of live contexts
    pub max_entries: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 30,
            max_entries: 100_000,
        }
    }
}

impl ContextConfig {
    /// Context time-to-live.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Interval between expiry sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Where audit records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    /// Process memory (development and tests)
    #[default]
    Memory,
    /// Append-only JSON lines file
    Jsonl,
    /// PostgreSQL table (requires the `postgres-storage` feature)
    Postgres,
}

impl std::str::FromStr for AuditBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(AuditBackend::Memory),
            "jsonl" => Ok(AuditBackend::Jsonl),
            "postgres" => Ok(AuditBackend::Postgres),
            _ => Err(Error::parse(format!("Unknown audit backend: {}", s))),
        }
    }
}

/// Audit recorder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Storage backend
    pub backend: AuditBackend,
    /// File used by the JSONL backend
    #[serde(default)]
    pub jsonl_path: Option<PathBuf>,
    /// Connection string used by the Postgres backend
    #[serde(default)]
    pub database_url: Option<String>,
    /// Maximum response summary length in characters, marker included
    pub max_summary_chars: usize,
    /// Maximum serialized size of caller metadata in bytes
    pub max_metadata_bytes: usize,
    /// Default time budget for one audit in milliseconds
    pub timeout_ms: u64,
    /// Persistence attempts before giving up
    pub retry_attempts: u32,
    /// Base backoff between persistence attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::Memory,
            jsonl_path: None,
            database_url: None,
            max_summary_chars: 1000,
            max_metadata_bytes: 8192,
            timeout_ms: 5000,
            retry_attempts: 3,
            retry_backoff_ms: 100,
        }
    }
}

impl AuditConfig {
    /// Default audit timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Base persistence backoff.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Tenant rule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Rule document loaded at startup
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Tenant used when a pre-check names none
    pub default_tenant: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            file: None,
            default_tenant: "default".to_string(),
        }
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether Prometheus metrics are recorded
    pub enabled: bool,
    /// Service name attached to log output
    pub service_name: String,
    /// Log level filter
    pub log_level: String,
    /// Emit logs as JSON
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "llm-governance-gateway".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
