//! # LLM Governance Gateway
//!
//! Policy pre-check and audit correlation engine for LLM calls. A caller asks
//! the gateway whether a request is safe to send to a provider, calls the
//! provider itself, and then reports what happened. The two calls are linked
//! by an unguessable correlation identifier that can be audited at most once.
//!
//! ## Features
//!
//! - **Detection**: Pattern-based findings for SSNs, payment cards, tax and national IDs, emails, phone numbers and SQL injection
//! - **Tenant Rules**: Per-category `block` / `warn` / `ignore` actions, fail-closed by default, hot-swappable
//! - **Correlation**: Short-lived contexts with atomic at-most-once consumption
//! - **Durable Audit**: Bounded retries, memory / JSONL / PostgreSQL stores
//! - **Observability**: `tracing` logs and Prometheus metrics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_governance_gateway::{AuditRequest, CallReport, GovernanceEngine, PreCheckRequest, TokenUsage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = GovernanceEngine::builder().build().await?;
//!
//!     let precheck = engine.pre_check(&PreCheckRequest::new("support-bot", "What is the capital of France?"))?;
//!     if !precheck.approved {
//!         println!("Blocked: {}", precheck.block_reason.unwrap_or_default());
//!         return Ok(());
//!     }
//!
//!     // ... call the provider ...
//!
//!     let report = CallReport::new("Paris is the capital.", "openai", "gpt-3.5-turbo", TokenUsage::new(20, 30), 420);
//!     let audit = engine.record_audit(AuditRequest::new(precheck.correlation_id, report)).await?;
//!     println!("Audited as {}", audit.audit_id);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod audit;
pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod detector;
pub mod error;
pub mod policy;
pub mod server;
pub mod telemetry;

// Re-export main types for convenience
pub use api::{
    AuditRequest, AuditResponse, ErrorBody, FindingView, GovernanceEngine, GovernanceEngineBuilder,
    PreCheckRequest, PreCheckResponse,
};
pub use audit::{AuditQuery, AuditRecord, AuditStore, CallReport, TokenUsage};
pub use client::GovernanceClient;
pub use config::Config;
pub use context::{ContextStore, PreCheckContext};
pub use detector::{Category, Detector, Finding, Severity};
pub use error::{Error, Result};
pub use policy::{Decision, RuleAction, RuleSet, TenantPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
